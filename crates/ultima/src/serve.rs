// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ultima serve`: startup order, feedback intake and shutdown drain.
//!
//! Startup is migrator, then guidelines cache, then reflection pipeline. The
//! pipeline is drained once SIGINT or SIGTERM arrives.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ultima_config::UltimaConfig;
use ultima_core::traits::PluginAdapter;
use ultima_core::{HealthStatus, UltimaError};
use ultima_learning::{
    FeedbackEvent, GuidelinesCache, HardwareTier, ReflectionPipeline, ReflectionSettings,
    RuleStore, SchemaMigrator, metrics,
};
use ultima_ollama::OllamaCompletion;

use crate::shutdown;

/// Lines buffered between the stdin reader thread and the runtime.
const STDIN_BUFFER: usize = 64;

pub async fn run_serve(config: UltimaConfig, read_stdin: bool) -> Result<(), UltimaError> {
    metrics::register_metrics();

    let store = RuleStore::new(&config.learning.guidelines_path);
    let embeddings = crate::embedding_service(&config).await;

    let migration = SchemaMigrator::new(store.clone(), embeddings.clone())
        .run()
        .await;
    info!(outcome = migration.label(), "rules file ready");

    let tier = HardwareTier::detect(&config.ollama.model);
    let cache = Arc::new(GuidelinesCache::open(store.clone(), tier, config.learning.cache_ttl()).await);
    let stats = cache.get_stats().await;
    info!(
        active = stats.active_count,
        retired = stats.retired_count,
        tier = %tier,
        "guidelines cache ready"
    );

    let completion = Arc::new(OllamaCompletion::new(&config.ollama)?);
    match completion.health_check().await {
        Ok(HealthStatus::Healthy) => info!(model = completion.model(), "completion service healthy"),
        Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
            warn!(model = completion.model(), reason = %reason, "completion service not ready, reflection may fail")
        }
        Err(e) => warn!(error = %e, "completion health check failed"),
    }

    let pipeline = Arc::new(ReflectionPipeline::start(
        store,
        Arc::clone(&cache),
        completion.clone(),
        embeddings,
        ReflectionSettings::from_config(&config),
    ));

    let cancel = shutdown::install_signal_handler();
    info!(agent = %config.agent.name, "ultima serving");

    if read_stdin {
        intake_stdin(&pipeline, &cancel).await;
    }
    cancel.cancelled().await;

    let report = pipeline.drain().await;
    info!(
        timed_out = report.timed_out,
        abandoned = report.abandoned,
        "shutdown complete"
    );
    if let Err(e) = completion.shutdown().await {
        warn!(error = %e, "completion adapter shutdown failed");
    }
    Ok(())
}

/// Schedules feedback read from stdin until EOF or shutdown.
///
/// Reading happens on a plain thread so a blocked read never holds up
/// runtime shutdown.
async fn intake_stdin(pipeline: &ReflectionPipeline, cancel: &CancellationToken) {
    let (tx, mut rx) = mpsc::channel::<String>(STDIN_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => submit_line(pipeline, &line),
                None => {
                    debug!("stdin closed, no more feedback will be read");
                    break;
                }
            },
        }
    }
}

fn submit_line(pipeline: &ReflectionPipeline, line: &str) {
    let event = match parse_feedback_line(line) {
        Some(Ok(event)) => event,
        Some(Err(e)) => {
            warn!(error = %e, "ignoring malformed feedback line");
            return;
        }
        None => return,
    };
    match pipeline.schedule(event) {
        Ok(handle) => debug!(feedback_id = handle.feedback_id(), "feedback accepted"),
        Err(e) => warn!(error = %e, "feedback rejected"),
    }
}

/// `None` for blank lines.
fn parse_feedback_line(line: &str) -> Option<Result<FeedbackEvent, serde_json::Error>> {
    let line = line.trim();
    (!line.is_empty()).then(|| serde_json::from_str(line))
}
