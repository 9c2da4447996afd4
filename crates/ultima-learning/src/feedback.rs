// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feedback events that feed the reflection pipeline.

use serde::{Deserialize, Deserializer, Serialize};

/// Verdict values that count as negative feedback (compared lowercased and trimmed).
const NEGATIVE_VERDICTS: &[&str] = &["thumbs_down", "negative", "dislike", "bad", "0", "false"];

/// One piece of user feedback on an assistant response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackEvent {
    #[serde(default = "new_feedback_id")]
    pub feedback_id: String,
    pub query: String,
    pub response: String,
    /// Free-form verdict; also accepted as `feedback_type`, and as a JSON
    /// bool or number.
    #[serde(alias = "feedback_type", deserialize_with = "verdict_from_any")]
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl FeedbackEvent {
    /// An event with a freshly generated feedback id.
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        verdict: impl Into<String>,
    ) -> Self {
        Self {
            feedback_id: new_feedback_id(),
            query: query.into(),
            response: response.into(),
            verdict: verdict.into(),
            user_id: None,
            conversation_id: None,
        }
    }

    pub fn is_negative(&self) -> bool {
        is_negative_verdict(&self.verdict)
    }
}

pub fn is_negative_verdict(verdict: &str) -> bool {
    let normalized = verdict.trim().to_lowercase();
    NEGATIVE_VERDICTS.contains(&normalized.as_str())
}

fn new_feedback_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn verdict_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "verdict must be a string, bool or number, got {other}"
        ))),
    }
}
