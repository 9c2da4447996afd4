// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write side of the learning loop: turns negative feedback into rules.
//!
//! [`ReflectionPipeline::schedule`] returns immediately. Events go through an
//! unbounded channel to a single worker task, the only writer of the rule
//! store, so events are processed one at a time in scheduling order. Each
//! event runs in its own tracked task; a panic there becomes a
//! [`ReflectionOutcome::Panicked`] and the worker moves on.
//!
//! Cancellation (only during [`ReflectionPipeline::drain`]) is checked between
//! stages and during model calls. The commit is never interrupted.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use ultima_config::UltimaConfig;
use ultima_core::UltimaError;
use ultima_core::traits::CompletionAdapter;

use crate::dedup::select_strategy;
use crate::embedding::EmbeddingService;
use crate::feedback::FeedbackEvent;
use crate::generator::{CandidateRule, RuleGenerator};
use crate::guidelines::GuidelinesCache;
use crate::lifecycle::LifecyclePolicy;
use crate::metrics;
use crate::store::RuleStore;
use crate::tier::HardwareTier;
use crate::types::{MAX_RULE_WORDS, MIN_RULE_WORDS, RuleRecord, RulesDocument, round3, word_count};

/// Fewest words a candidate's source summary may have.
pub const MIN_SUMMARY_WORDS: usize = 5;

/// Extra time given to cancelled work after the drain timeout.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Why an event produced no change.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    QueryTooShort,
    ResponseTooShort,
    NotNegative,
    LowConfidence,
    /// Rule text word count outside the accepted range.
    RuleLength(usize),
    /// Source summary word count below the minimum.
    ThinSummary(usize),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryTooShort => f.write_str("query too short"),
            Self::ResponseTooShort => f.write_str("response too short"),
            Self::NotNegative => f.write_str("feedback is not negative"),
            Self::LowConfidence => f.write_str("candidate confidence below minimum"),
            Self::RuleLength(words) => write!(
                f,
                "rule has {words} words, expected {MIN_RULE_WORDS}-{MAX_RULE_WORDS}"
            ),
            Self::ThinSummary(words) => write!(
                f,
                "source summary has {words} words, expected at least {MIN_SUMMARY_WORDS}"
            ),
        }
    }
}

/// Final result of one feedback event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectionOutcome {
    Skipped { reason: SkipReason },
    GenerationFailed { error: String },
    /// The existing store could not be read; nothing was written.
    StoreUnavailable { error: String },
    /// The commit failed; the previous document is still on disk.
    PersistFailed { error: String },
    Created { rule_id: String, confidence: f64 },
    Reinforced {
        rule_id: String,
        trigger_count: u32,
        confidence: f64,
    },
    Cancelled,
    Panicked { message: String },
}

impl ReflectionOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::PersistFailed { .. } => "persist_failed",
            Self::Created { .. } => "created",
            Self::Reinforced { .. } => "reinforced",
            Self::Cancelled => "cancelled",
            Self::Panicked { .. } => "panicked",
        }
    }
}

/// Tunables for the pipeline, usually taken from [`UltimaConfig`].
#[derive(Debug, Clone)]
pub struct ReflectionSettings {
    pub min_query_chars: usize,
    pub min_response_chars: usize,
    pub min_confidence: f64,
    pub similarity_threshold: f32,
    pub overlap_threshold: f32,
    pub confidence_boost: f64,
    pub initial_confidence_scale: f64,
    pub max_output_tokens: u32,
    pub response_truncate_chars: usize,
    pub lifecycle: LifecyclePolicy,
    pub drain_timeout: Duration,
}

impl ReflectionSettings {
    pub fn from_config(config: &UltimaConfig) -> Self {
        let learning = &config.learning;
        let tier = HardwareTier::detect(&config.ollama.model);
        Self {
            min_query_chars: learning.min_query_chars,
            min_response_chars: learning.min_response_chars,
            min_confidence: learning.min_confidence,
            similarity_threshold: learning.embedding_similarity_threshold,
            overlap_threshold: learning.lexical_overlap_threshold,
            confidence_boost: learning.confidence_boost,
            initial_confidence_scale: learning.initial_confidence_scale,
            max_output_tokens: config.ollama.max_output_tokens,
            response_truncate_chars: learning.response_truncate_chars,
            lifecycle: LifecyclePolicy {
                stale_after: chrono::Duration::try_days(learning.stale_after_days)
                    .unwrap_or(chrono::Duration::MAX),
                stale_min_triggers: learning.stale_min_triggers,
                active_cap: tier.active_rule_cap(),
            },
            drain_timeout: learning.drain_timeout(),
        }
    }
}

/// Result of [`ReflectionPipeline::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Outstanding work had to be cancelled.
    pub timed_out: bool,
    /// Events still pending when the timeout hit.
    pub abandoned: usize,
}

struct Job {
    event: FeedbackEvent,
    reply: oneshot::Sender<ReflectionOutcome>,
}

/// Awaitable result of a scheduled event.
#[derive(Debug)]
pub struct ReflectionHandle {
    feedback_id: String,
    rx: oneshot::Receiver<ReflectionOutcome>,
}

impl ReflectionHandle {
    pub fn feedback_id(&self) -> &str {
        &self.feedback_id
    }

    /// Waits for the event to finish. A job dropped without a reply
    /// (pipeline torn down) reports `Cancelled`.
    pub async fn outcome(self) -> ReflectionOutcome {
        self.rx.await.unwrap_or(ReflectionOutcome::Cancelled)
    }
}

pub struct ReflectionPipeline {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
    drain_timeout: Duration,
}

impl ReflectionPipeline {
    /// Spawns the worker. Must be called within a tokio runtime.
    pub fn start(
        store: RuleStore,
        cache: Arc<GuidelinesCache>,
        completion: Arc<dyn CompletionAdapter>,
        embeddings: EmbeddingService,
        settings: ReflectionSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let drain_timeout = settings.drain_timeout;

        let worker = Arc::new(Worker {
            generator: RuleGenerator::new(
                completion,
                settings.max_output_tokens,
                settings.response_truncate_chars,
            ),
            store,
            cache,
            embeddings,
            settings,
            cancel: cancel.clone(),
        });

        tracker.spawn(run_worker(
            rx,
            worker,
            tracker.clone(),
            cancel.clone(),
            Arc::clone(&pending),
        ));
        info!("reflection pipeline started");

        Self {
            tx: Mutex::new(Some(tx)),
            tracker,
            cancel,
            pending,
            drain_timeout,
        }
    }

    /// Queues `event` for reflection. Fails only after [`drain`](Self::drain).
    pub fn schedule(&self, event: FeedbackEvent) -> Result<ReflectionHandle, UltimaError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(UltimaError::QueueClosed)?;

        let feedback_id = event.feedback_id.clone();
        let (reply, rx) = oneshot::channel();
        // Counted before sending so the worker can never decrement first.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(Job { event, reply }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(UltimaError::QueueClosed);
        }

        debug!(feedback_id = %feedback_id, "feedback scheduled for reflection");
        Ok(ReflectionHandle { feedback_id, rx })
    }

    /// Events scheduled but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stops accepting events and waits for queued work, cancelling whatever
    /// is still outstanding after the drain timeout.
    pub async fn drain(&self) -> DrainReport {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        self.tracker.close();
        info!(pending = self.pending(), "draining reflection pipeline");

        if tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_ok()
        {
            info!("reflection pipeline drained");
            return DrainReport {
                timed_out: false,
                abandoned: 0,
            };
        }

        let abandoned = self.pending();
        warn!(
            abandoned,
            timeout_secs = self.drain_timeout.as_secs(),
            "drain timed out, cancelling outstanding reflection work"
        );
        self.cancel.cancel();
        if tokio::time::timeout(CANCEL_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("reflection work still running after cancellation");
        }
        DrainReport {
            timed_out: true,
            abandoned,
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    worker: Arc<Worker>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
) {
    while let Some(Job { event, reply }) = rx.recv().await {
        let feedback_id = event.feedback_id.clone();
        let started = Instant::now();

        let outcome = if cancel.is_cancelled() {
            ReflectionOutcome::Cancelled
        } else {
            let worker = Arc::clone(&worker);
            match tracker.spawn(async move { worker.process(event).await }).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => ReflectionOutcome::Panicked {
                    message: panic_message(e.into_panic()),
                },
                Err(_) => ReflectionOutcome::Cancelled,
            }
        };

        log_outcome(&feedback_id, &outcome);
        metrics::record_outcome(outcome.label());
        metrics::record_reflection_duration(started.elapsed().as_secs_f64());
        pending.fetch_sub(1, Ordering::SeqCst);
        // The caller may have dropped its handle.
        let _ = reply.send(outcome);
    }
    debug!("reflection worker stopped");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn log_outcome(feedback_id: &str, outcome: &ReflectionOutcome) {
    match outcome {
        ReflectionOutcome::Created {
            rule_id,
            confidence,
        } => info!(feedback_id, rule_id = %rule_id, confidence, "new rule learned"),
        ReflectionOutcome::Reinforced {
            rule_id,
            trigger_count,
            confidence,
        } => info!(feedback_id, rule_id = %rule_id, trigger_count, confidence, "existing rule reinforced"),
        ReflectionOutcome::Skipped { reason } => {
            info!(feedback_id, reason = %reason, "feedback skipped")
        }
        ReflectionOutcome::GenerationFailed { error } => {
            warn!(feedback_id, error = %error, "rule generation abandoned")
        }
        ReflectionOutcome::StoreUnavailable { error } => {
            error!(feedback_id, error = %error, "rules file unreadable, event abandoned")
        }
        ReflectionOutcome::PersistFailed { error } => {
            error!(feedback_id, error = %error, "commit failed, previous rules kept")
        }
        ReflectionOutcome::Cancelled => warn!(feedback_id, "reflection cancelled"),
        ReflectionOutcome::Panicked { message } => {
            error!(feedback_id, panic = %message, "reflection task panicked")
        }
    }
}

/// Rejects candidates that parsed but are not worth keeping.
pub fn validate_candidate(candidate: &CandidateRule, min_confidence: f64) -> Result<(), SkipReason> {
    if candidate.confidence < min_confidence {
        return Err(SkipReason::LowConfidence);
    }
    let words = word_count(&candidate.rule_text);
    if !(MIN_RULE_WORDS..=MAX_RULE_WORDS).contains(&words) {
        return Err(SkipReason::RuleLength(words));
    }
    let summary_words = word_count(&candidate.source_summary);
    if summary_words < MIN_SUMMARY_WORDS {
        return Err(SkipReason::ThinSummary(summary_words));
    }
    Ok(())
}

struct Worker {
    generator: RuleGenerator,
    store: RuleStore,
    cache: Arc<GuidelinesCache>,
    embeddings: EmbeddingService,
    settings: ReflectionSettings,
    cancel: CancellationToken,
}

impl Worker {
    async fn process(&self, event: FeedbackEvent) -> ReflectionOutcome {
        let query = event.query.trim();
        let response = event.response.trim();

        if let Err(reason) = self.quality_gate(query, response, &event) {
            return ReflectionOutcome::Skipped { reason };
        }
        if self.cancel.is_cancelled() {
            return ReflectionOutcome::Cancelled;
        }

        let candidate = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ReflectionOutcome::Cancelled,
            result = self.generator.generate(query, response) => match result {
                Ok(candidate) => candidate,
                Err(e) => return ReflectionOutcome::GenerationFailed { error: e.to_string() },
            },
        };

        if let Err(reason) = validate_candidate(&candidate, self.settings.min_confidence) {
            return ReflectionOutcome::Skipped { reason };
        }
        if self.cancel.is_cancelled() {
            return ReflectionOutcome::Cancelled;
        }

        let mut doc = match self.store.read().await {
            Ok(Some(doc)) => doc,
            Ok(None) => RulesDocument::empty(),
            Err(e) => return ReflectionOutcome::StoreUnavailable { error: e.to_string() },
        };

        let embedding = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ReflectionOutcome::Cancelled,
            embedding = self.embeddings.encode(&candidate.rule_text) => embedding,
        };

        let outcome = self.merge_or_create(&mut doc, candidate, embedding);

        let report = self.settings.lifecycle.apply(&mut doc.rules, Utc::now());
        if report.total() > 0 {
            debug!(
                stale = report.retired_stale.len(),
                over_cap = report.retired_over_cap.len(),
                "lifecycle maintenance retired rules"
            );
        }
        if self.cancel.is_cancelled() {
            return ReflectionOutcome::Cancelled;
        }

        doc.touch();
        if let Err(e) = self.store.atomic_replace(&doc).await {
            return ReflectionOutcome::PersistFailed { error: e.to_string() };
        }
        self.cache.force_reload().await;

        outcome
    }

    fn quality_gate(
        &self,
        query: &str,
        response: &str,
        event: &FeedbackEvent,
    ) -> Result<(), SkipReason> {
        if query.chars().count() < self.settings.min_query_chars {
            return Err(SkipReason::QueryTooShort);
        }
        if response.chars().count() < self.settings.min_response_chars {
            return Err(SkipReason::ResponseTooShort);
        }
        if !event.is_negative() {
            return Err(SkipReason::NotNegative);
        }
        Ok(())
    }

    /// Reinforces the duplicate of `candidate` or appends it as a new rule.
    fn merge_or_create(
        &self,
        doc: &mut RulesDocument,
        candidate: CandidateRule,
        embedding: Option<Vec<f32>>,
    ) -> ReflectionOutcome {
        let strategy = select_strategy(
            embedding.clone(),
            self.settings.similarity_threshold,
            self.settings.overlap_threshold,
        );

        if let Some(found) = strategy.find_duplicate(&candidate.rule_text, &doc.rules) {
            let rule = &mut doc.rules[found.index];
            rule.trigger_count = rule.trigger_count.saturating_add(1);
            rule.confidence = round3((rule.confidence + self.settings.confidence_boost).min(1.0));
            rule.last_triggered = Utc::now();
            debug!(
                strategy = strategy.name(),
                score = found.score,
                kind = ?found.kind,
                rule_id = %rule.id,
                "duplicate found"
            );
            return ReflectionOutcome::Reinforced {
                rule_id: rule.id.clone(),
                trigger_count: rule.trigger_count,
                confidence: rule.confidence,
            };
        }

        let mut record = RuleRecord::new(
            candidate.rule_text,
            round3(candidate.confidence * self.settings.initial_confidence_scale),
        );
        record.embedding = embedding.unwrap_or_default();
        record.query_types = vec![candidate.query_type];
        record.language_hint = candidate.language_hint;
        record.source_summary = candidate.source_summary;
        record.generating_model = candidate.model;

        let outcome = ReflectionOutcome::Created {
            rule_id: record.id.clone(),
            confidence: record.confidence,
        };
        doc.rules.push(record);
        outcome
    }
}
