//! Centralized default constants for the docpipe system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// BATCH PROCESSING
// =============================================================================

/// Maximum simultaneous in-flight extraction calls.
pub const MAX_CONCURRENT: usize = 3;

/// Documents dequeued per pipeline poll.
pub const BATCH_SIZE: usize = 10;

/// Per-call extraction timeout in seconds.
pub const EXTRACT_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// RETRY
// =============================================================================

/// Maximum processing attempts per document before it is failed permanently.
pub const MAX_ATTEMPTS: u32 = 3;

// =============================================================================
// CIRCUIT BREAKER
// =============================================================================

/// Consecutive failures on a backend before its breaker opens.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Base cooldown in seconds after the breaker opens.
pub const BREAKER_BASE_BACKOFF_SECS: u64 = 60;

/// Cap on the exponentially growing cooldown, in seconds.
pub const BREAKER_MAX_BACKOFF_SECS: u64 = 900;

// =============================================================================
// RESULT CACHE
// =============================================================================

/// Maximum cached extraction results before least-recently-used eviction.
pub const CACHE_MAX_ENTRIES: usize = 1000;

/// Cache entry time-to-live in seconds (one week, matching typical ETag
/// stability of slow-moving documentation buckets).
pub const CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

// =============================================================================
// PIPELINE
// =============================================================================

/// Polling interval in milliseconds when the queue is empty.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// WEBHOOK
// =============================================================================

/// Webhook HTTP request timeout in seconds.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Immediate delivery attempts per notification (no delayed retry queue:
/// notification loss is an accepted failure mode).
pub const WEBHOOK_MAX_ATTEMPTS: u32 = 2;
