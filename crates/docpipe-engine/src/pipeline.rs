//! Pipeline orchestrator: a polling loop that drains the processing queue
//! in batches, records outcomes, re-enqueues retryable failures, and fires
//! webhook notifications for terminal outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use docpipe_core::config::EngineConfig;
use docpipe_core::defaults;
use docpipe_core::models::{DocumentRecord, OutcomeStatus, ProcessingState};
use docpipe_core::traits::{DiscoveryFeed, DocumentStore};
use docpipe_core::{Error, Result};

use crate::batch::BatchProcessor;
use crate::breaker::CircuitBreaker;
use crate::cache::ResultCache;
use crate::queue::ProcessingQueue;
use crate::registry::ProcessorRegistry;
use crate::webhook::WebhookNotifier;

/// Configuration for the pipeline loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Number of documents claimed per batch.
    pub batch_size: usize,
    /// Whether the loop runs at all.
    pub enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            batch_size: defaults::BATCH_SIZE,
            enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DOCPIPE_PIPELINE_ENABLED` | `true` | Enable/disable the pipeline loop |
    /// | `DOCPIPE_BATCH_SIZE` | `10` | Documents claimed per batch |
    /// | `DOCPIPE_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let enabled = std::env::var("DOCPIPE_PIPELINE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let batch_size = std::env::var("DOCPIPE_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BATCH_SIZE)
            .max(1);

        let poll_interval_ms = std::env::var("DOCPIPE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            batch_size,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the pipeline loop.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Pipeline loop started.
    Started,
    /// A batch of documents was claimed and processed.
    BatchCompleted {
        claimed: usize,
        succeeded: usize,
        failed_retryable: usize,
        failed_permanent: usize,
    },
    /// A document reached a terminal state.
    DocumentFinished {
        document_id: String,
        state: ProcessingState,
    },
    /// A retryable failure was re-enqueued.
    DocumentRequeued { document_id: String, attempts: u32 },
    /// Processing paused; the loop idles without claiming documents.
    Paused,
    /// Processing resumed.
    Resumed,
    /// Pipeline loop stopped.
    Stopped,
}

/// Handle for controlling a running pipeline.
pub struct PipelineHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<PipelineEvent>,
    paused: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Signal the pipeline to shut down after the in-flight batch finishes.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Pause processing: the loop keeps running but claims no documents.
    /// The in-flight batch finishes normally.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Pipeline processing PAUSED");
    }

    /// Resume processing after a pause.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("Pipeline processing RESUMED");
    }

    /// Check the pause flag (hot path, lock-free).
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Get a receiver for pipeline events.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_rx.resubscribe()
    }
}

/// Builder wiring the pipeline's collaborators together.
pub struct PipelineBuilder {
    store: Arc<dyn DocumentStore>,
    registry: Option<ProcessorRegistry>,
    engine_config: EngineConfig,
    pipeline_config: PipelineConfig,
    notifier: Option<WebhookNotifier>,
}

impl PipelineBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            registry: None,
            engine_config: EngineConfig::default(),
            pipeline_config: PipelineConfig::default(),
            notifier: None,
        }
    }

    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: WebhookNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Pipeline {
        let registry = Arc::new(
            self.registry
                .unwrap_or_else(|| ProcessorRegistry::builder().build()),
        );
        let cache = Arc::new(ResultCache::new(self.engine_config.cache.clone()));
        let breaker = Arc::new(CircuitBreaker::new(self.engine_config.breaker.clone()));
        let batch = Arc::new(BatchProcessor::new(
            registry.clone(),
            cache.clone(),
            breaker.clone(),
            &self.engine_config,
        ));
        let queue = Arc::new(ProcessingQueue::new(
            self.store.clone(),
            self.engine_config.max_attempts,
        ));
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);

        Pipeline {
            store: self.store,
            queue,
            batch,
            cache,
            breaker,
            notifier: Arc::new(self.notifier.unwrap_or_else(WebhookNotifier::disabled)),
            config: self.pipeline_config,
            event_tx,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// The orchestrator tying queue, batch processor, and notifier together.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    queue: Arc<ProcessingQueue>,
    batch: Arc<BatchProcessor>,
    cache: Arc<ResultCache>,
    breaker: Arc<CircuitBreaker>,
    notifier: Arc<WebhookNotifier>,
    config: PipelineConfig,
    event_tx: broadcast::Sender<PipelineEvent>,
    paused: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn builder(store: Arc<dyn DocumentStore>) -> PipelineBuilder {
        PipelineBuilder::new(store)
    }

    pub fn queue(&self) -> &Arc<ProcessingQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Drain a discovery feed: upsert every reported document and enqueue
    /// the ones the queue accepts. Returns the number of documents queued.
    pub async fn ingest<F: DiscoveryFeed + ?Sized>(&self, feed: &mut F) -> Result<usize> {
        let mut queued = 0usize;
        while let Some(page) = feed.next_page().await? {
            debug!(page_len = page.len(), "Discovery page received");
            for document in page {
                // Existing record wins: discovery must not clobber attempt
                // history for documents already tracked.
                let record = match self.store.get(&document.id).await? {
                    Some(mut existing) => {
                        // Content changed: re-process from scratch so the
                        // cache keys on the new fingerprint. Documents
                        // mid-flight (queued/in progress) finish their
                        // current pass first; the new fingerprint lands on
                        // the next discovery sweep.
                        let mid_flight = matches!(
                            existing.state,
                            ProcessingState::Queued | ProcessingState::InProgress
                        );
                        if existing.fingerprint != document.fingerprint && !mid_flight {
                            existing.fingerprint = document.fingerprint.clone();
                            existing.state = ProcessingState::Discovered;
                            existing.attempts = 0;
                            existing.last_error = None;
                        }
                        existing.size_bytes = document.size_bytes;
                        existing.last_modified = document.last_modified;
                        self.store.upsert(&existing).await?;
                        existing
                    }
                    None => {
                        self.store.upsert(&document).await?;
                        document
                    }
                };

                match record.state {
                    ProcessingState::Discovered | ProcessingState::FailedRetryable => {
                        if self.queue.enqueue(&record).await? == ProcessingState::Queued {
                            queued += 1;
                        }
                    }
                    other => {
                        debug!(document_id = %record.id, state = ?other, "Skipping enqueue");
                    }
                }
            }
        }
        info!(queued, "Discovery ingest completed");
        Ok(queued)
    }

    /// Claim and process a single batch. Returns the number of documents
    /// claimed (zero means the queue was empty).
    ///
    /// Transient store failures while recording outcomes are logged and
    /// skipped; [`Error::InvalidState`] propagates, since it means the
    /// state machine was violated.
    pub async fn run_once(&self) -> Result<usize> {
        let documents = self.queue.dequeue_batch(self.config.batch_size).await?;
        if documents.is_empty() {
            return Ok(0);
        }
        let claimed = documents.len();

        let report = self.batch.process(documents).await;

        for outcome in &report.outcomes {
            let record = match self.queue.record_outcome(outcome).await {
                Ok(record) => record,
                // A state machine violation is a bug, not a transient fault.
                Err(e @ Error::InvalidState { .. }) => return Err(e),
                Err(e) => {
                    error!(
                        document_id = %outcome.document_id,
                        error = %e,
                        "Failed to record outcome"
                    );
                    continue;
                }
            };

            match record.state {
                ProcessingState::FailedRetryable => {
                    // Back into the queue while the attempt budget lasts. An
                    // exhausted budget is converted by the queue itself.
                    match self.queue.enqueue(&record).await {
                        Ok(ProcessingState::Queued) => {
                            let _ = self.event_tx.send(PipelineEvent::DocumentRequeued {
                                document_id: record.id.clone(),
                                attempts: record.attempts,
                            });
                        }
                        Ok(ProcessingState::FailedPermanent) => {
                            // Attempt budget exhausted; the queue converted
                            // the record, so the notification must follow.
                            let exhausted = docpipe_core::models::ItemOutcome::failed(
                                &record.id,
                                OutcomeStatus::FailedPermanent,
                                record.last_error.clone().unwrap_or_default(),
                            );
                            self.finish(&record, exhausted).await;
                        }
                        Ok(state) => {
                            warn!(document_id = %record.id, state = ?state, "Unexpected enqueue result");
                        }
                        Err(e @ Error::InvalidState { .. }) => return Err(e),
                        Err(e) => {
                            error!(document_id = %record.id, error = %e, "Re-enqueue failed");
                        }
                    }
                }
                ProcessingState::Succeeded | ProcessingState::FailedPermanent => {
                    self.finish(&record, outcome.clone()).await;
                }
                state => {
                    warn!(document_id = %record.id, state = ?state, "Unexpected post-outcome state");
                }
            }
        }

        let _ = self.event_tx.send(PipelineEvent::BatchCompleted {
            claimed,
            succeeded: report.summary.succeeded,
            failed_retryable: report.summary.failed_retryable,
            failed_permanent: report.summary.failed_permanent,
        });

        Ok(claimed)
    }

    async fn finish(&self, record: &DocumentRecord, outcome: docpipe_core::models::ItemOutcome) {
        // Refresh the record so the notification carries the final state.
        let current = match self.store.get(&record.id).await {
            Ok(Some(current)) => current,
            _ => record.clone(),
        };
        self.notifier.notify(&current, &outcome);
        let _ = self.event_tx.send(PipelineEvent::DocumentFinished {
            document_id: current.id.clone(),
            state: current.state,
        });
    }

    /// Start the polling loop and return a handle for control.
    pub fn start(self) -> PipelineHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let paused = self.paused.clone();

        let pipeline = Arc::new(self);
        tokio::spawn(async move {
            pipeline.run(&mut shutdown_rx).await;
        });

        PipelineHandle {
            shutdown_tx,
            event_rx,
            paused,
        }
    }

    /// Run the polling loop. Only sleeps when the queue is empty; a
    /// non-empty queue is drained batch after batch without pausing.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Pipeline is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Pipeline started"
        );
        let _ = self.event_tx.send(PipelineEvent::Started);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut was_paused = false;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Pipeline received shutdown signal");
                break;
            }

            if self.paused.load(Ordering::SeqCst) {
                if !was_paused {
                    was_paused = true;
                    info!("Pipeline paused, idling");
                    let _ = self.event_tx.send(PipelineEvent::Paused);
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Pipeline received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
                continue;
            }
            if was_paused {
                was_paused = false;
                info!("Pipeline resumed");
                let _ = self.event_tx.send(PipelineEvent::Resumed);
            }

            match self.run_once().await {
                Ok(0) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Pipeline received shutdown signal");
                            break;
                        }
                        _ = sleep(poll_interval) => {}
                    }
                }
                Ok(claimed) => {
                    debug!(claimed, "Batch cycle completed");
                }
                Err(e) => {
                    error!(error = %e, "Batch cycle failed");
                    sleep(poll_interval).await;
                }
            }
        }

        let _ = self.event_tx.send(PipelineEvent::Stopped);
        info!("Pipeline stopped");
    }
}
