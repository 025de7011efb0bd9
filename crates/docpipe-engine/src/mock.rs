//! Mock extraction backend for deterministic testing.
//!
//! Scripts failures up front and counts calls so tests can assert exactly
//! how many times the underlying backend was invoked (e.g. zero on a cache
//! hit, one probe after a breaker cooldown).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use docpipe_core::error::{Error, Result};
use docpipe_core::models::{DocumentRecord, ExtractionResult};
use docpipe_core::traits::ExtractionBackend;

/// Failure kinds a mock call can be scripted to produce.
#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    Backend,
    Timeout,
    Malformed,
}

/// Deterministic [`ExtractionBackend`] test double.
pub struct MockBackend {
    id: String,
    latency: Duration,
    /// Failures consumed front-to-back; an empty script means success.
    script: Mutex<VecDeque<MockFailure>>,
    calls: AtomicUsize,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Script the next `n` calls to fail as transient backend errors.
    pub fn fail_times(self, n: usize) -> Self {
        self.fail_times_with(n, MockFailure::Backend)
    }

    /// Script the next `n` calls to fail with the given kind.
    pub fn fail_times_with(self, n: usize, failure: MockFailure) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for _ in 0..n {
                script.push_back(failure);
            }
        }
        self
    }

    /// Number of `extract` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Document IDs in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn extract(&self, document: &DocumentRecord) -> Result<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().unwrap().push(document.id.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(MockFailure::Backend) => Err(Error::ExtractionBackend(format!(
                "mock backend failure for {}",
                document.filename
            ))),
            Some(MockFailure::Timeout) => Err(Error::ExtractionTimeout {
                backend: self.id.clone(),
                timeout_secs: 0,
            }),
            Some(MockFailure::Malformed) => Err(Error::MalformedInput(format!(
                "mock malformed input: {}",
                document.filename
            ))),
            None => Ok(ExtractionResult {
                extracted_text: Some(format!("extracted: {}", document.filename)),
                payload: json!({
                    "pages": [{"page_number": 1, "content": document.filename}],
                }),
                backend: self.id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docpipe_core::models::DocumentType;

    fn doc(key: &str) -> DocumentRecord {
        DocumentRecord::discovered(key, 64, Utc::now(), "etag", DocumentType::Manual)
    }

    #[tokio::test]
    async fn test_success_by_default() {
        let backend = MockBackend::new("datalabs");
        let result = backend.extract(&doc("manuals/a.pdf")).await.unwrap();
        assert_eq!(result.backend, "datalabs");
        assert_eq!(result.extracted_text.as_deref(), Some("extracted: a.pdf"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let backend = MockBackend::new("datalabs").fail_times(2);
        assert!(backend.extract(&doc("a.pdf")).await.is_err());
        assert!(backend.extract(&doc("a.pdf")).await.is_err());
        assert!(backend.extract(&doc("a.pdf")).await.is_ok());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_failure_kind() {
        let backend = MockBackend::new("datalabs").fail_times_with(1, MockFailure::Malformed);
        let err = backend.extract(&doc("a.pdf")).await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_call_log_records_document_ids() {
        let backend = MockBackend::new("datalabs");
        let a = doc("a.pdf");
        let b = doc("b.pdf");
        backend.extract(&a).await.unwrap();
        backend.extract(&b).await.unwrap();
        assert_eq!(backend.calls(), vec![a.id, b.id]);
    }
}
