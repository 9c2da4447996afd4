// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate detection between a candidate rule and the active rule set.
//!
//! [`SemanticDedup`] is used when the candidate has an embedding,
//! [`LexicalDedup`] otherwise. Both return the best match at or above
//! their threshold.

use std::collections::HashSet;

use crate::embedding::EmbeddingService;
use crate::types::RuleRecord;

/// Words ignored by lexical overlap.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can", "to",
    "of", "in", "for", "on", "with", "at", "by", "from", "as", "it", "its", "that", "this", "and",
    "or", "but", "not", "no", "so", "if", "when", "then", "than",
];

/// How a duplicate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Embedding,
    Lexical,
}

/// The existing rule a candidate duplicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateMatch {
    /// Index into the slice passed to [`DedupStrategy::find_duplicate`].
    pub index: usize,
    pub score: f32,
    pub kind: MatchKind,
}

pub trait DedupStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best active duplicate of `candidate` in `rules`, if any.
    fn find_duplicate(&self, candidate: &str, rules: &[RuleRecord]) -> Option<DuplicateMatch>;
}

/// Jaccard overlap of stop-word filtered token sets.
#[derive(Debug, Clone)]
pub struct LexicalDedup {
    threshold: f32,
}

impl LexicalDedup {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn score(&self, candidate: &HashSet<String>, rule: &RuleRecord) -> Option<f32> {
        let overlap = jaccard(candidate, &tokenize(&rule.rule_text));
        (overlap >= self.threshold).then_some(overlap)
    }
}

impl DedupStrategy for LexicalDedup {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn find_duplicate(&self, candidate: &str, rules: &[RuleRecord]) -> Option<DuplicateMatch> {
        let tokens = tokenize(candidate);
        best(rules.iter().enumerate().filter(|(_, r)| r.is_active()).filter_map(|(index, rule)| {
            self.score(&tokens, rule).map(|score| DuplicateMatch {
                index,
                score,
                kind: MatchKind::Lexical,
            })
        }))
    }
}

/// Cosine similarity against stored embeddings.
///
/// Active rules without an embedding of the candidate's dimension are
/// compared lexically instead. An embedding match wins over a lexical one.
#[derive(Debug, Clone)]
pub struct SemanticDedup {
    embedding: Vec<f32>,
    threshold: f32,
    lexical: LexicalDedup,
}

impl SemanticDedup {
    pub fn new(embedding: Vec<f32>, threshold: f32, lexical: LexicalDedup) -> Self {
        Self {
            embedding,
            threshold,
            lexical,
        }
    }
}

impl DedupStrategy for SemanticDedup {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn find_duplicate(&self, candidate: &str, rules: &[RuleRecord]) -> Option<DuplicateMatch> {
        let dim = self.embedding.len();
        let tokens = tokenize(candidate);
        let mut semantic = Vec::new();
        let mut lexical = Vec::new();

        for (index, rule) in rules.iter().enumerate().filter(|(_, r)| r.is_active()) {
            if rule.embedding.len() == dim {
                let score = EmbeddingService::similarity(&self.embedding, &rule.embedding);
                if score >= self.threshold {
                    semantic.push(DuplicateMatch {
                        index,
                        score,
                        kind: MatchKind::Embedding,
                    });
                }
            } else if let Some(score) = self.lexical.score(&tokens, rule) {
                lexical.push(DuplicateMatch {
                    index,
                    score,
                    kind: MatchKind::Lexical,
                });
            }
        }

        best(semantic.into_iter()).or_else(|| best(lexical.into_iter()))
    }
}

/// Picks the strategy for a candidate: semantic when it has an embedding.
pub fn select_strategy(
    embedding: Option<Vec<f32>>,
    similarity_threshold: f32,
    overlap_threshold: f32,
) -> Box<dyn DedupStrategy> {
    let lexical = LexicalDedup::new(overlap_threshold);
    match embedding {
        Some(embedding) if !embedding.is_empty() => {
            Box::new(SemanticDedup::new(embedding, similarity_threshold, lexical))
        }
        _ => Box::new(lexical),
    }
}

/// Highest score; the earliest rule wins ties.
fn best(matches: impl Iterator<Item = DuplicateMatch>) -> Option<DuplicateMatch> {
    matches.fold(None, |acc: Option<DuplicateMatch>, m| match acc {
        Some(current) if current.score >= m.score => Some(current),
        _ => Some(m),
    })
}

/// Lowercased words with surrounding punctuation trimmed and stop words removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard overlap of two token sets; 0.0 when either is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

/// Lexical overlap between two texts.
pub fn lexical_overlap(a: &str, b: &str) -> f32 {
    jaccard(&tokenize(a), &tokenize(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleStatus;

    fn rule(text: &str, embedding: Vec<f32>) -> RuleRecord {
        let mut r = RuleRecord::new(text, 0.5);
        r.embedding = embedding;
        r
    }

    #[test]
    fn tokenize_trims_punctuation_and_stopwords() {
        let tokens = tokenize("Always answer in Hindi, when the user asks in Hindi.");
        let expected: HashSet<String> = ["always", "answer", "hindi", "user", "asks"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn overlap_of_identical_and_disjoint_texts() {
        assert_eq!(lexical_overlap("reply in hindi", "Reply in Hindi!"), 1.0);
        assert_eq!(lexical_overlap("reply in hindi", "cite sources"), 0.0);
        assert_eq!(lexical_overlap("the a an", "the"), 0.0);
    }

    #[test]
    fn lexical_threshold_is_inclusive() {
        // {alpha beta gamma delta} vs {alpha beta gamma epsilon}: 3/5 = 0.6
        let rules = vec![rule("alpha beta gamma delta", vec![])];
        let at = LexicalDedup::new(0.6).find_duplicate("alpha beta gamma epsilon", &rules);
        assert_eq!(at.map(|m| m.index), Some(0));
        let above = LexicalDedup::new(0.61).find_duplicate("alpha beta gamma epsilon", &rules);
        assert!(above.is_none());
    }

    #[test]
    fn retired_rules_are_never_matched() {
        let mut retired = rule("alpha beta gamma", vec![1.0, 0.0]);
        retired.status = RuleStatus::Retired;
        let rules = vec![retired];
        assert!(LexicalDedup::new(0.55).find_duplicate("alpha beta gamma", &rules).is_none());
        let semantic = SemanticDedup::new(vec![1.0, 0.0], 0.82, LexicalDedup::new(0.55));
        assert!(semantic.find_duplicate("alpha beta gamma", &rules).is_none());
    }

    #[test]
    fn semantic_picks_best_match_over_threshold() {
        let rules = vec![
            rule("first", vec![0.85, (1.0f32 - 0.85 * 0.85).sqrt()]),
            rule("second", vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt()]),
            rule("third", vec![0.5, (1.0f32 - 0.25).sqrt()]),
        ];
        let strategy = SemanticDedup::new(vec![1.0, 0.0], 0.82, LexicalDedup::new(0.55));
        let found = strategy.find_duplicate("unrelated words", &rules).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.kind, MatchKind::Embedding);
    }

    #[test]
    fn semantic_falls_back_to_lexical_for_rules_without_embeddings() {
        let rules = vec![
            rule("reply entirely in hindi including technical terms", vec![]),
            rule("cite every source", vec![0.1, 0.99]),
        ];
        let strategy = SemanticDedup::new(vec![1.0, 0.0], 0.82, LexicalDedup::new(0.55));
        let found = strategy
            .find_duplicate("Reply entirely in Hindi, including technical terms.", &rules)
            .unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(found.kind, MatchKind::Lexical);
    }

    #[test]
    fn select_strategy_by_availability() {
        assert_eq!(select_strategy(Some(vec![1.0]), 0.82, 0.55).name(), "semantic");
        assert_eq!(select_strategy(None, 0.82, 0.55).name(), "lexical");
        assert_eq!(select_strategy(Some(vec![]), 0.82, 0.55).name(), "lexical");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn overlap_is_symmetric_and_bounded(a in "[a-z ]{0,60}", b in "[a-z ]{0,60}") {
                let ab = lexical_overlap(&a, &b);
                let ba = lexical_overlap(&b, &a);
                prop_assert!((0.0..=1.0).contains(&ab));
                prop_assert!((ab - ba).abs() < f32::EPSILON);
            }
        }
    }
}
