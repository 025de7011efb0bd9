//! Structured logging field name constants for docpipe.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Component within the engine.
/// Examples: "queue", "batch", "breaker", "cache", "webhook", "pipeline"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "enqueue", "dequeue_batch", "record_outcome", "extract", "notify"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document ID being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Document type enum variant.
pub const DOC_TYPE: &str = "doc_type";

/// Extraction backend identifier.
pub const BACKEND: &str = "backend";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Attempt number for the current document.
pub const ATTEMPT: &str = "attempt";

/// Number of documents in a batch.
pub const BATCH_LEN: &str = "batch_len";

/// Whether the result came from the cache.
pub const CACHE_HIT: &str = "cache_hit";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
