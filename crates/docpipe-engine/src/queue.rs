//! The authoritative processing state machine.
//!
//! All document state transitions flow through this queue, which mediates
//! between discovery, batching, and terminal recording. It enforces the
//! at-most-one-attempt-in-flight invariant: a document already queued or in
//! progress cannot be enqueued again, and outcomes are only accepted for
//! documents actually in progress.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use docpipe_core::error::{Error, Result};
use docpipe_core::models::{
    DocumentRecord, ItemOutcome, OutcomeStatus, ProcessingState, QueueStats,
};
use docpipe_core::traits::DocumentStore;

/// FIFO index entry: enqueue time first, document ID breaks ties so the
/// dequeue order is deterministic.
type QueueSlot = (DateTime<Utc>, String);

struct QueueIndex {
    queued: BTreeSet<QueueSlot>,
    in_progress: HashSet<String>,
}

/// Orchestration queue over a [`DocumentStore`].
///
/// Locking is scoped per document: each record's transitions serialize
/// through its own async mutex, so concurrent `enqueue`, `dequeue_batch`,
/// and `record_outcome` callers never lose updates or double-dispatch a
/// document, while unrelated documents proceed in parallel. The FIFO index
/// lock is held only for in-memory mutation, never across store I/O.
pub struct ProcessingQueue {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
    index: Mutex<QueueIndex>,
    doc_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProcessingQueue {
    pub fn new(store: Arc<dyn DocumentStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            index: Mutex::new(QueueIndex {
                queued: BTreeSet::new(),
                in_progress: HashSet::new(),
            }),
            doc_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.doc_locks.lock().unwrap();
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Terminal documents no longer transition; their lock entry can go.
    fn drop_lock_entry(&self, id: &str) {
        self.doc_locks.lock().unwrap().remove(id);
    }

    /// Accept a document in state `discovered` or `failed_retryable` and
    /// transition it to `queued`.
    ///
    /// A retryable document that has exhausted its attempt budget is
    /// converted to `failed_permanent` instead; the returned state tells the
    /// caller which transition happened. Documents already `queued`,
    /// `in_progress`, or terminal fail with [`Error::InvalidState`].
    pub async fn enqueue(&self, document: &DocumentRecord) -> Result<ProcessingState> {
        let doc_lock = self.lock_for(&document.id);
        let _guard = doc_lock.lock().await;

        // The store is the source of truth; the passed record is only used
        // for first-time discovery.
        let mut record = match self.store.get(&document.id).await? {
            Some(existing) => existing,
            None => document.clone(),
        };

        match record.state {
            ProcessingState::Discovered => {}
            ProcessingState::FailedRetryable => {
                if record.attempts >= self.max_attempts {
                    record.state = ProcessingState::FailedPermanent;
                    record.last_error = Some(format!(
                        "attempt budget exhausted after {} attempts: {}",
                        record.attempts,
                        record.last_error.as_deref().unwrap_or("unknown error")
                    ));
                    self.store.upsert(&record).await?;
                    self.drop_lock_entry(&record.id);
                    warn!(
                        document_id = %record.id,
                        attempts = record.attempts,
                        "Document exceeded max attempts, failing permanently"
                    );
                    return Ok(ProcessingState::FailedPermanent);
                }
            }
            state => {
                return Err(Error::InvalidState {
                    document_id: record.id.clone(),
                    state,
                    action: "enqueue",
                });
            }
        }

        record.state = ProcessingState::Queued;
        self.store.upsert(&record).await?;
        {
            let mut index = self.index.lock().unwrap();
            index.queued.insert((Utc::now(), record.id.clone()));
        }
        debug!(document_id = %record.id, filename = %record.filename, "Document enqueued");
        Ok(ProcessingState::Queued)
    }

    /// Atomically remove up to `limit` queued documents (FIFO by enqueue
    /// time) and transition them to `in_progress`. Returns an empty vec when
    /// nothing is queued.
    pub async fn dequeue_batch(&self, limit: usize) -> Result<Vec<DocumentRecord>> {
        // Claim slots under the index lock only; the per-document store
        // round-trips happen outside it.
        let claimed: Vec<String> = {
            let mut index = self.index.lock().unwrap();
            let slots: Vec<QueueSlot> = index.queued.iter().take(limit).cloned().collect();
            let mut ids = Vec::with_capacity(slots.len());
            for slot in slots {
                index.queued.remove(&slot);
                index.in_progress.insert(slot.1.clone());
                ids.push(slot.1);
            }
            ids
        };

        let mut batch = Vec::with_capacity(claimed.len());
        for id in claimed {
            let doc_lock = self.lock_for(&id);
            let _guard = doc_lock.lock().await;
            let mut record = self.store.get(&id).await?.ok_or_else(|| {
                Error::Store(format!("queued document {id} missing from store"))
            })?;
            if record.state != ProcessingState::Queued {
                // Store mutated behind the index; drop the claim.
                warn!(document_id = %id, state = ?record.state, "Claimed document not queued, skipping");
                self.index.lock().unwrap().in_progress.remove(&id);
                continue;
            }
            record.state = ProcessingState::InProgress;
            self.store.upsert(&record).await?;
            batch.push(record);
        }

        if !batch.is_empty() {
            debug!(batch_len = batch.len(), "Dequeued processing batch");
        }
        Ok(batch)
    }

    /// Record the outcome of an `in_progress` document, incrementing its
    /// attempt count and transitioning it per the outcome status.
    ///
    /// Fails with [`Error::InvalidState`] if the document is not in
    /// progress, guarding against stale or duplicate outcome reports.
    pub async fn record_outcome(&self, outcome: &ItemOutcome) -> Result<DocumentRecord> {
        let doc_lock = self.lock_for(&outcome.document_id);
        let _guard = doc_lock.lock().await;

        let mut record = self
            .store
            .get(&outcome.document_id)
            .await?
            .ok_or_else(|| {
                Error::Store(format!("document {} missing from store", outcome.document_id))
            })?;

        if record.state != ProcessingState::InProgress {
            return Err(Error::InvalidState {
                document_id: record.id.clone(),
                state: record.state,
                action: "record outcome for",
            });
        }

        record.attempts += 1;
        record.last_attempt_at = Some(outcome.completed_at);
        record.state = match outcome.status {
            OutcomeStatus::Succeeded => ProcessingState::Succeeded,
            OutcomeStatus::FailedRetryable => ProcessingState::FailedRetryable,
            OutcomeStatus::FailedPermanent => ProcessingState::FailedPermanent,
        };
        record.last_error = outcome.error.clone();

        self.store.upsert(&record).await?;
        self.index.lock().unwrap().in_progress.remove(&record.id);
        if record.state.is_terminal() {
            self.drop_lock_entry(&record.id);
        }

        info!(
            document_id = %record.id,
            attempt = record.attempts,
            state = ?record.state,
            "Recorded processing outcome"
        );
        Ok(record)
    }

    /// Whether a retryable document still has attempt budget left.
    pub fn can_retry(&self, record: &DocumentRecord) -> bool {
        record.state == ProcessingState::FailedRetryable && record.attempts < self.max_attempts
    }

    /// Number of documents currently queued.
    pub async fn queued_len(&self) -> usize {
        self.index.lock().unwrap().queued.len()
    }

    /// Queue statistics, combining the live index with terminal counts from
    /// the store.
    pub async fn stats(&self) -> Result<QueueStats> {
        let (queued, in_progress) = {
            let index = self.index.lock().unwrap();
            (index.queued.len(), index.in_progress.len())
        };
        Ok(QueueStats {
            queued,
            in_progress,
            succeeded: self
                .store
                .list_by_state(ProcessingState::Succeeded)
                .await?
                .len(),
            failed_retryable: self
                .store
                .list_by_state(ProcessingState::FailedRetryable)
                .await?
                .len(),
            failed_permanent: self
                .store
                .list_by_state(ProcessingState::FailedPermanent)
                .await?
                .len(),
        })
    }
}
