//! Extraction backend registry for dispatching by document type.
//!
//! The mapping is built once at startup and passed explicitly to the
//! components that need it; there is no process-wide mutable registry.

use std::collections::HashMap;
use std::sync::Arc;

use docpipe_core::error::{Error, Result};
use docpipe_core::models::DocumentType;
use docpipe_core::traits::ExtractionBackend;

/// Immutable mapping from document type to its extraction backend.
pub struct ProcessorRegistry {
    backends: HashMap<DocumentType, Arc<dyn ExtractionBackend>>,
}

impl ProcessorRegistry {
    pub fn builder() -> ProcessorRegistryBuilder {
        ProcessorRegistryBuilder {
            backends: HashMap::new(),
        }
    }

    /// Resolve the backend for a document type. Unknown or unmapped types
    /// fail with [`Error::UnsupportedType`] rather than defaulting.
    pub fn resolve(&self, doc_type: DocumentType) -> Result<Arc<dyn ExtractionBackend>> {
        self.backends
            .get(&doc_type)
            .cloned()
            .ok_or(Error::UnsupportedType(doc_type))
    }

    pub fn has_backend(&self, doc_type: DocumentType) -> bool {
        self.backends.contains_key(&doc_type)
    }

    /// All document types that have a registered backend.
    pub fn available_types(&self) -> Vec<DocumentType> {
        self.backends.keys().copied().collect()
    }

    /// Run health checks on all registered backends, keyed by backend id.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for backend in self.backends.values() {
            let healthy = backend.health_check().await.unwrap_or(false);
            results.insert(backend.id().to_string(), healthy);
        }
        results
    }
}

/// Builder collecting registrations before the registry is frozen.
pub struct ProcessorRegistryBuilder {
    backends: HashMap<DocumentType, Arc<dyn ExtractionBackend>>,
}

impl ProcessorRegistryBuilder {
    /// Map a document type to a backend. Replaces any previous mapping for
    /// the same type.
    pub fn with_backend(
        mut self,
        doc_type: DocumentType,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        self.backends.insert(doc_type, backend);
        self
    }

    pub fn build(self) -> ProcessorRegistry {
        ProcessorRegistry {
            backends: self.backends,
        }
    }
}
