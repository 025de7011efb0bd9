//! Core traits for docpipe abstractions.
//!
//! These traits define the seams to external collaborators, enabling
//! pluggable backends and testability. Implementations of extraction,
//! durable storage, and discovery live outside the engine.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentRecord, ExtractionResult, ProcessingState};

/// An extraction service for one document type.
///
/// Implementations are polymorphic over a single capability: `extract`.
/// They must not share mutable state with one another.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Stable backend identifier, used for circuit breaker accounting and
    /// cache keying.
    fn id(&self) -> &str;

    /// Extract text/structure from the document.
    async fn extract(&self, document: &DocumentRecord) -> Result<ExtractionResult>;

    /// Lightweight reachability probe. Defaults to healthy.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

impl std::fmt::Debug for dyn ExtractionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionBackend")
            .field("id", &self.id())
            .finish()
    }
}

/// Durable keyed storage for document records.
///
/// The engine requires only get-by-id, upsert, and query-by-state; schema
/// and transport are implementation concerns.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a record by its document ID.
    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>>;

    /// Insert or replace a record.
    async fn upsert(&self, record: &DocumentRecord) -> Result<()>;

    /// All records currently in the given state.
    async fn list_by_state(&self, state: ProcessingState) -> Result<Vec<DocumentRecord>>;
}

/// A lazy, restartable sequence of candidate documents from object storage.
///
/// Pages mirror storage list pagination; `None` signals exhaustion. The
/// engine only consumes this sequence via the processing queue.
#[async_trait]
pub trait DiscoveryFeed: Send {
    async fn next_page(&mut self) -> Result<Option<Vec<DocumentRecord>>>;
}
