//! # docpipe-engine
//!
//! Processing orchestration engine for document extraction.
//!
//! This crate provides:
//! - A processing queue with attempt budgets and FIFO dispatch
//! - Bounded-concurrency batch execution with partial-failure semantics
//! - Per-backend circuit breakers with exponential cooldown
//! - Content-addressed result caching keyed by fingerprint
//! - Fire-and-forget webhook notifications for terminal outcomes
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docpipe_core::{DocumentType, EngineConfig, MemoryDocumentStore};
//! use docpipe_engine::{Pipeline, PipelineConfig, ProcessorRegistry};
//!
//! let store = Arc::new(MemoryDocumentStore::new());
//! let registry = ProcessorRegistry::builder()
//!     .with_backend(DocumentType::Manual, Arc::new(my_backend))
//!     .build();
//!
//! let pipeline = Pipeline::builder(store)
//!     .with_registry(registry)
//!     .with_engine_config(EngineConfig::from_env()?)
//!     .with_pipeline_config(PipelineConfig::from_env())
//!     .build();
//!
//! // Drain object-storage discovery into the queue, then run.
//! pipeline.ingest(&mut feed).await?;
//! let handle = pipeline.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod batch;
pub mod breaker;
pub mod cache;
pub mod mock;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod webhook;

// Re-export core types
pub use docpipe_core::*;

pub use batch::{BatchProcessor, BatchReport};
pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitMode};
pub use cache::{CacheKey, CacheStats, ResultCache};
pub use mock::{MockBackend, MockFailure};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineEvent, PipelineHandle};
pub use queue::ProcessingQueue;
pub use registry::{ProcessorRegistry, ProcessorRegistryBuilder};
pub use webhook::{NotifierStats, WebhookNotifier, WebhookPayload};
