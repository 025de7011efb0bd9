//! # docpipe-core
//!
//! Core types, traits, and abstractions for the docpipe processing engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the engine crate depends on: the document record model
//! and its state machine, the error taxonomy, configuration, and the seams
//! to external collaborators (extraction backends, the metadata store, the
//! discovery feed).

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod store;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{BreakerConfig, CacheConfig, EngineConfig};
pub use error::{Error, Result};
pub use models::*;
pub use store::MemoryDocumentStore;
pub use traits::{DiscoveryFeed, DocumentStore, ExtractionBackend};
