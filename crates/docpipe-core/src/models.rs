//! Core data model for document processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Declared type of a discovered document.
///
/// A closed enumeration: unknown types carry the `Unknown` variant and fail
/// registry lookup explicitly instead of falling back to a default backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Manual,
    Diagram,
    SparePartsList,
    Spreadsheet,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Manual => "manual",
            DocumentType::Diagram => "diagram",
            DocumentType::SparePartsList => "spare_parts_list",
            DocumentType::Spreadsheet => "spreadsheet",
            DocumentType::Unknown => "unknown",
        }
    }
}

/// Processing state of a document, forming the state machine
/// `discovered -> queued -> in_progress -> {succeeded | failed_retryable | failed_permanent}`.
///
/// `failed_retryable` may re-enter `queued` while the document's attempt
/// budget lasts. `succeeded` and `failed_permanent` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Discovered,
    Queued,
    InProgress,
    Succeeded,
    FailedRetryable,
    FailedPermanent,
}

impl ProcessingState {
    /// Whether no further automatic transition occurs from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Succeeded | ProcessingState::FailedPermanent
        )
    }
}

/// A document observed in object storage, tracked through processing.
///
/// Records are created on first discovery, mutated on every processing
/// attempt, and never hard-deleted: permanently failed records persist for
/// audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable identity derived from the storage key.
    pub id: String,
    /// Full object storage key.
    pub storage_key: String,
    /// Basename of the storage key.
    pub filename: String,
    /// Object size in bytes.
    pub size_bytes: u64,
    /// Storage last-modified timestamp.
    pub last_modified: DateTime<Utc>,
    /// Content fingerprint (ETag-style): changes iff content changes.
    pub fingerprint: String,
    /// Declared document type.
    pub doc_type: DocumentType,
    /// Current processing state. Transitions only through the queue.
    pub state: ProcessingState,
    /// Number of processing attempts so far. Monotonically non-decreasing.
    pub attempts: u32,
    /// Timestamp of the most recent attempt outcome.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
}

impl DocumentRecord {
    /// Create a freshly discovered record from storage listing data.
    pub fn discovered(
        storage_key: impl Into<String>,
        size_bytes: u64,
        last_modified: DateTime<Utc>,
        fingerprint: impl Into<String>,
        doc_type: DocumentType,
    ) -> Self {
        let storage_key = storage_key.into();
        let filename = storage_key
            .rsplit('/')
            .next()
            .unwrap_or(storage_key.as_str())
            .to_string();
        Self {
            id: document_id(&storage_key),
            storage_key,
            filename,
            size_bytes,
            last_modified,
            fingerprint: fingerprint.into(),
            doc_type,
            state: ProcessingState::Discovered,
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }
}

/// Derive the stable document ID from a storage key.
pub fn document_id(storage_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(storage_key.as_bytes());
    let hash = hex::encode(hasher.finalize());
    hash[..16].to_string()
}

/// Output of a successful extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Plain-text rendition of the document, when the backend produces one.
    pub extracted_text: Option<String>,
    /// Structured payload (pages, tables, backend-specific metadata).
    pub payload: JsonValue,
    /// Identifier of the backend that produced this result.
    pub backend: String,
}

/// Where a succeeded outcome's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Backend,
    Cache,
}

/// Terminal-or-retryable classification of a single processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    FailedRetryable,
    FailedPermanent,
}

/// Outcome of one batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub document_id: String,
    pub status: OutcomeStatus,
    /// Set for succeeded outcomes; cache hits skip the backend entirely.
    pub source: ResultSource,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ItemOutcome {
    pub fn succeeded(document_id: impl Into<String>, source: ResultSource) -> Self {
        Self {
            document_id: document_id.into(),
            status: OutcomeStatus::Succeeded,
            source,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        document_id: impl Into<String>,
        status: OutcomeStatus,
        error: impl Into<String>,
    ) -> Self {
        debug_assert!(status != OutcomeStatus::Succeeded);
        Self {
            document_id: document_id.into(),
            status,
            source: ResultSource::Backend,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}

/// Aggregate summary of a batch run. Finalized only after every item has
/// reported an outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    pub cache_hits: usize,
    pub duration_ms: u64,
    /// Representative error message for the retryable category, if any.
    pub retryable_error_sample: Option<String>,
    /// Representative error message for the permanent category, if any.
    pub permanent_error_sample: Option<String>,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => {
                self.succeeded += 1;
                if outcome.source == ResultSource::Cache {
                    self.cache_hits += 1;
                }
            }
            OutcomeStatus::FailedRetryable => {
                self.failed_retryable += 1;
                if self.retryable_error_sample.is_none() {
                    self.retryable_error_sample = outcome.error.clone();
                }
            }
            OutcomeStatus::FailedPermanent => {
                self.failed_permanent += 1;
                if self.permanent_error_sample.is_none() {
                    self.permanent_error_sample = outcome.error.clone();
                }
            }
        }
    }
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
}
