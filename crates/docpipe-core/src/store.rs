//! In-memory reference implementation of [`DocumentStore`].
//!
//! Suitable for tests and embedders that do not need durability: a process
//! restart clears it, so documents re-discovered afterwards reprocess from
//! scratch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{DocumentRecord, ProcessingState};
use crate::traits::DocumentStore;

/// Thread-safe in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    records: Arc<RwLock<HashMap<String, DocumentRecord>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total record count, regardless of state.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_by_state(&self, state: ProcessingState) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect())
    }
}
