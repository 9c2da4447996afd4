// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drafting candidate rules from failed interactions with the completion model.
//!
//! The model is asked for one JSON object. Its reply is cleaned of
//! `<think>` blocks, the first JSON object is cut out of any surrounding
//! prose, and the result is schema-checked. Transport errors, malformed
//! JSON and schema failures share one retry.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use ultima_core::UltimaError;
use ultima_core::traits::CompletionAdapter;
use ultima_core::types::{CompletionRequest, ResponseFormat};

use crate::types::{MAX_RULE_WORDS, MIN_RULE_WORDS, QueryType, word_count};

const MAX_ATTEMPTS: u32 = 2;

/// Accepted range of the model's self-reported confidence.
pub const MIN_GENERATED_CONFIDENCE: f64 = 0.1;
pub const MAX_GENERATED_CONFIDENCE: f64 = 1.0;

const SYSTEM_PROMPT: &str = "\
You are a behavioral learning agent for an AI assistant. \
Analyze the failed interaction and extract ONE specific, actionable behavioral rule \
to prevent this failure in the future. \
The rule must start with a verb (Always, When, Avoid, Ensure, Never), be between 15 and 150 words, \
and say exactly what to do differently next time. \
query_type is one of: factual, reasoning, multilingual, technical, creative, general. \
language_hint is the language code of the failed query (en, hi, te, auto, ...). \
source_summary is 10-20 words describing what went wrong. \
confidence_in_rule is between 0.1 and 1.0.
Output ONLY valid JSON matching this schema:
{\"rule\": \"...\", \"query_type\": \"...\", \"language_hint\": \"...\", \"source_summary\": \"...\", \"confidence_in_rule\": 0.0}
No explanations, no markdown. Just the JSON object.";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("think pattern is valid"));

/// A schema-valid rule proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRule {
    pub rule_text: String,
    pub query_type: QueryType,
    pub language_hint: String,
    pub source_summary: String,
    /// Model's confidence in the rule, in `[0.1, 1.0]`.
    pub confidence: f64,
    /// Model that drafted the rule.
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    rule: String,
    #[serde(default)]
    query_type: String,
    #[serde(default)]
    language_hint: String,
    #[serde(default)]
    source_summary: String,
    confidence_in_rule: f64,
}

/// Asks the completion service for a candidate rule.
pub struct RuleGenerator {
    completion: Arc<dyn CompletionAdapter>,
    max_tokens: u32,
    truncate_chars: usize,
}

impl RuleGenerator {
    pub fn new(completion: Arc<dyn CompletionAdapter>, max_tokens: u32, truncate_chars: usize) -> Self {
        Self {
            completion,
            max_tokens,
            truncate_chars,
        }
    }

    /// Drafts a rule for a failed `query`/`response` pair, retrying once.
    pub async fn generate(&self, query: &str, response: &str) -> Result<CandidateRule, UltimaError> {
        let request = self.build_request(query, response);
        let mut attempt = 1;

        loop {
            let result = match self.completion.complete(request.clone()).await {
                Ok(reply) => parse_candidate(&reply.text, &reply.model),
                Err(e) => Err(e),
            };

            match result {
                Ok(candidate) => {
                    info!(
                        query_type = %candidate.query_type,
                        confidence = candidate.confidence,
                        words = word_count(&candidate.rule_text),
                        "rule generated"
                    );
                    return Ok(candidate);
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, transport = e.is_transport(), error = %e, "rule generation failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt, error = %e, "rule generation failed after retry");
                    return Err(e);
                }
            }
        }
    }

    fn build_request(&self, query: &str, response: &str) -> CompletionRequest {
        let prompt = format!(
            "Failed query: {query}\n\n\
             Failed response (truncated): {}\n\n\
             User feedback: Negative (thumbs down)\n\n\
             Extract one behavioral rule to improve future responses.",
            truncate_chars(response, self.truncate_chars)
        );

        let mut request = CompletionRequest::new(prompt);
        request.system = Some(SYSTEM_PROMPT.to_string());
        request.format = ResponseFormat::Json;
        request.max_tokens = self.max_tokens;
        request
    }
}

/// Parses and schema-checks a raw model reply.
pub fn parse_candidate(raw: &str, model: &str) -> Result<CandidateRule, UltimaError> {
    let cleaned = THINK_BLOCK.replace_all(raw, "");
    let json = extract_json_object(cleaned.trim())
        .ok_or_else(|| UltimaError::MalformedOutput("no JSON object in model output".into()))?;

    let parsed: RawCandidate = serde_json::from_str(json)
        .map_err(|e| UltimaError::MalformedOutput(format!("rule JSON does not match schema: {e}")))?;

    if !(MIN_GENERATED_CONFIDENCE..=MAX_GENERATED_CONFIDENCE).contains(&parsed.confidence_in_rule) {
        return Err(UltimaError::MalformedOutput(format!(
            "confidence_in_rule {} outside [0.1, 1.0]",
            parsed.confidence_in_rule
        )));
    }

    let words = word_count(&parsed.rule);
    if !(MIN_RULE_WORDS..=MAX_RULE_WORDS).contains(&words) {
        return Err(UltimaError::MalformedOutput(format!(
            "rule has {words} words, expected {MIN_RULE_WORDS}-{MAX_RULE_WORDS}"
        )));
    }

    let language_hint = match parsed.language_hint.trim() {
        "" => "auto".to_string(),
        hint => hint.to_string(),
    };

    debug!(words, "candidate parsed");
    Ok(CandidateRule {
        rule_text: parsed.rule.trim().to_string(),
        query_type: QueryType::parse_lenient(&parsed.query_type),
        language_hint,
        source_summary: parsed.source_summary.trim().to_string(),
        confidence: parsed.confidence_in_rule,
        model: model.to_string(),
    })
}

/// The first balanced `{...}` span in `text` that parses as a JSON object.
///
/// Braces inside string literals (including escaped quotes) are ignored, so
/// prose and code fences around the object do not matter.
pub fn extract_json_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let span = balanced_span(&text[start..])?;
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(span)
            .is_ok()
            .then_some(span)
    })
}

/// Slice of `text` (which starts with `{`) up to its matching `}`.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultima_test_utils::{MockCompletion, MockReply};

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn rule_json(rule: &str, confidence: f64) -> String {
        serde_json::json!({
            "rule": rule,
            "query_type": "multilingual",
            "language_hint": "hi",
            "source_summary": "Response was in English when the user asked in Hindi",
            "confidence_in_rule": confidence,
        })
        .to_string()
    }

    #[test]
    fn think_blocks_and_prose_are_stripped() {
        let raw = format!(
            "<think>maybe {{\"rule\": 1}}</think>Sure! Here it is:\n```json\n{}\n```",
            rule_json(&words(20), 0.9)
        );
        let candidate = parse_candidate(&raw, "qwen3:8b").unwrap();
        assert_eq!(word_count(&candidate.rule_text), 20);
        assert_eq!(candidate.query_type, QueryType::Multilingual);
        assert_eq!(candidate.model, "qwen3:8b");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let text = r#"note {not json} then {"a": "x } y \" {", "b": {"c": 1}} trailing }"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": "x } y \" {", "b": {"c": 1}}"#)
        );
        assert_eq!(extract_json_object("no object here"), None);
        assert_eq!(extract_json_object("{\"open\": "), None);
    }

    #[test]
    fn schema_word_bounds() {
        assert!(parse_candidate(&rule_json(&words(15), 0.5), "m").is_ok());
        assert!(parse_candidate(&rule_json(&words(150), 0.5), "m").is_ok());
        assert!(matches!(
            parse_candidate(&rule_json(&words(14), 0.5), "m"),
            Err(UltimaError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_candidate(&rule_json(&words(151), 0.5), "m"),
            Err(UltimaError::MalformedOutput(_))
        ));
    }

    #[test]
    fn schema_confidence_bounds() {
        assert!(parse_candidate(&rule_json(&words(20), 0.1), "m").is_ok());
        assert!(parse_candidate(&rule_json(&words(20), 0.05), "m").is_err());
        assert!(parse_candidate(&rule_json(&words(20), 1.2), "m").is_err());
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let raw = format!(
            r#"{{"rule": "{}", "query_type": "astrology", "confidence_in_rule": 0.7}}"#,
            words(16)
        );
        let candidate = parse_candidate(&raw, "m").unwrap();
        assert_eq!(candidate.query_type, QueryType::General);
        assert_eq!(candidate.language_hint, "auto");
        assert_eq!(candidate.source_summary, "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("नमस्ते दुनिया", 3), "नमस");
        assert_eq!(truncate_chars("short", 600), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }

    #[tokio::test]
    async fn one_retry_after_malformed_output() {
        let mock = MockCompletion::with_replies(vec![
            MockReply::Text("I cannot comply".into()),
            MockReply::Text(rule_json(&words(20), 0.8)),
        ]);
        let generator = RuleGenerator::new(Arc::new(mock.clone()), 512, 600);

        let candidate = generator.generate("query", "response").await.unwrap();
        assert_eq!(candidate.confidence, 0.8);
        assert_eq!(mock.call_count().await, 2);
    }

    #[tokio::test]
    async fn transport_and_content_failures_share_the_budget() {
        let mock = MockCompletion::with_replies(vec![
            MockReply::ProviderError("connection refused".into()),
            MockReply::Text(rule_json(&words(3), 0.8)),
            MockReply::Text(rule_json(&words(20), 0.8)),
        ]);
        let generator = RuleGenerator::new(Arc::new(mock.clone()), 512, 600);

        assert!(generator.generate("query", "response").await.is_err());
        assert_eq!(mock.call_count().await, 2);
    }

    #[tokio::test]
    async fn request_shape() {
        let mock = MockCompletion::always(rule_json(&words(20), 0.8));
        let generator = RuleGenerator::new(Arc::new(mock.clone()), 512, 5);
        generator.generate("Translate to Hindi", "Hello there").await.unwrap();

        let request = &mock.requests().await[0];
        assert_eq!(request.format, ResponseFormat::Json);
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 512);
        assert!(request.prompt.contains("Failed query: Translate to Hindi"));
        assert!(request.prompt.contains("Failed response (truncated): Hello\n"));
        assert!(request.system.as_deref().unwrap_or_default().contains("JSON"));
    }
}
