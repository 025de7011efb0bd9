//! Bounded-concurrency batch execution.
//!
//! Drives a work list of documents through registry resolution, the result
//! cache, and the circuit breaker, with partial-failure semantics: one
//! item's failure never aborts its siblings, and the aggregate summary is
//! finalized only after every item has reported an outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use docpipe_core::config::EngineConfig;
use docpipe_core::error::Error;
use docpipe_core::models::{
    BatchSummary, DocumentRecord, ItemOutcome, OutcomeStatus, ResultSource,
};

use crate::breaker::CircuitBreaker;
use crate::cache::{CacheKey, ResultCache};
use crate::registry::ProcessorRegistry;

/// Per-batch result: item outcomes in completion order plus the summary.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    pub summary: BatchSummary,
}

/// Executes batches of documents with bounded concurrency.
pub struct BatchProcessor {
    registry: Arc<ProcessorRegistry>,
    cache: Arc<ResultCache>,
    breaker: Arc<CircuitBreaker>,
    max_concurrent: usize,
    extract_timeout: Duration,
    cancelled: Arc<AtomicBool>,
}

impl BatchProcessor {
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        cache: Arc<ResultCache>,
        breaker: Arc<CircuitBreaker>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            breaker,
            max_concurrent: config.max_concurrent.max(1),
            extract_timeout: config.extract_timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cooperative cancellation of the batch currently running: no
    /// further extraction is dispatched, already-dispatched items finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        info!("Batch cancellation requested");
    }

    /// Process `documents` concurrently, at most `max_concurrent` extraction
    /// calls outstanding at a time. Every document receives exactly one
    /// outcome; outcomes arrive in completion order.
    pub async fn process(&self, documents: Vec<DocumentRecord>) -> BatchReport {
        let start = Instant::now();
        let total = documents.len();
        self.cancelled.store(false, Ordering::SeqCst);

        info!(
            batch_len = total,
            max_concurrent = self.max_concurrent,
            "Starting batch processing"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for document in documents {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            let cache = self.cache.clone();
            let breaker = self.breaker.clone();
            let cancelled = self.cancelled.clone();
            let extract_timeout = self.extract_timeout;

            tasks.spawn(async move {
                // Permit not held for cancelled items: nothing is dispatched.
                if cancelled.load(Ordering::SeqCst) {
                    return ItemOutcome::failed(
                        &document.id,
                        OutcomeStatus::FailedRetryable,
                        "batch cancelled before dispatch",
                    );
                }
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if cancelled.load(Ordering::SeqCst) {
                    return ItemOutcome::failed(
                        &document.id,
                        OutcomeStatus::FailedRetryable,
                        "batch cancelled before dispatch",
                    );
                }
                process_item(&registry, &cache, &breaker, extract_timeout, &document).await
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    summary.record(&outcome);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    // A panicked item cannot report an outcome; surface it
                    // loudly rather than inventing one for an unknown id.
                    error!(error = ?e, "Batch item task panicked");
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            batch_len = total,
            succeeded = summary.succeeded,
            failed_retryable = summary.failed_retryable,
            failed_permanent = summary.failed_permanent,
            cache_hits = summary.cache_hits,
            duration_ms = summary.duration_ms,
            "Batch processing completed"
        );

        BatchReport { outcomes, summary }
    }
}

/// Process one document: resolve backend, consult the cache, and only on a
/// miss call the backend through the circuit breaker with a per-call
/// timeout. Extraction errors become outcomes here; they never escape.
async fn process_item(
    registry: &ProcessorRegistry,
    cache: &ResultCache,
    breaker: &CircuitBreaker,
    extract_timeout: Duration,
    document: &DocumentRecord,
) -> ItemOutcome {
    let backend = match registry.resolve(document.doc_type) {
        Ok(backend) => backend,
        Err(e) => {
            warn!(document_id = %document.id, doc_type = ?document.doc_type, "No backend registered");
            return ItemOutcome::failed(&document.id, OutcomeStatus::FailedPermanent, e.to_string());
        }
    };

    let backend_id = backend.id().to_string();
    let key = CacheKey::new(&document.fingerprint, document.doc_type, &backend_id);

    if cache.get(&key).is_some() {
        debug!(document_id = %document.id, backend = %backend_id, cache_hit = true, "Skipping extraction");
        return ItemOutcome::succeeded(&document.id, ResultSource::Cache);
    }

    let op_backend = backend.clone();
    let op_document = document.clone();
    let op_backend_id = backend_id.clone();
    let call_result = breaker
        .call(&backend_id, move || async move {
            match tokio::time::timeout(extract_timeout, op_backend.extract(&op_document)).await {
                Ok(result) => result,
                Err(_) => Err(Error::ExtractionTimeout {
                    backend: op_backend_id,
                    timeout_secs: extract_timeout.as_secs(),
                }),
            }
        })
        .await;

    match call_result {
        Ok(result) => {
            cache.put(&key, result);
            ItemOutcome::succeeded(&document.id, ResultSource::Backend)
        }
        Err(err @ Error::CircuitOpen { .. }) => {
            // The breaker already accounted for the underlying failures; skip
            // to the next item immediately with no extra waiting.
            ItemOutcome::failed(&document.id, OutcomeStatus::FailedRetryable, err.to_string())
        }
        Err(e) if e.is_permanent() => {
            ItemOutcome::failed(&document.id, OutcomeStatus::FailedPermanent, e.to_string())
        }
        Err(e) => {
            ItemOutcome::failed(&document.id, OutcomeStatus::FailedRetryable, e.to_string())
        }
    }
}
