//! End-to-end pipeline tests: discovery ingest through queue, batch
//! execution, retry budget, circuit breaker recovery, and notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use docpipe_core::config::{BreakerConfig, EngineConfig};
use docpipe_core::models::{DocumentRecord, DocumentType, ProcessingState};
use docpipe_core::store::MemoryDocumentStore;
use docpipe_core::traits::{DiscoveryFeed, DocumentStore};
use docpipe_core::{Error, Result};
use docpipe_engine::mock::MockBackend;
use docpipe_engine::pipeline::{Pipeline, PipelineConfig};
use docpipe_engine::registry::ProcessorRegistry;
use docpipe_engine::webhook::WebhookNotifier;

/// Feed yielding a single page of documents, then exhausted.
struct OnePage(Option<Vec<DocumentRecord>>);

#[async_trait]
impl DiscoveryFeed for OnePage {
    async fn next_page(&mut self) -> Result<Option<Vec<DocumentRecord>>> {
        Ok(self.0.take())
    }
}

fn doc(key: &str, fingerprint: &str) -> DocumentRecord {
    DocumentRecord::discovered(key, 2048, Utc::now(), fingerprint, DocumentType::Manual)
}

fn docs(n: usize) -> Vec<DocumentRecord> {
    (0..n)
        .map(|i| doc(&format!("manuals/doc-{i}.pdf"), &format!("etag-{i}")))
        .collect()
}

#[tokio::test]
async fn test_ingest_and_run_once_succeeds_all_documents() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs"));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .build();

    let mut feed = OnePage(Some(docs(3)));
    assert_eq!(pipeline.ingest(&mut feed).await.unwrap(), 3);
    assert_eq!(pipeline.run_once().await.unwrap(), 3);

    let succeeded = store
        .list_by_state(ProcessingState::Succeeded)
        .await
        .unwrap();
    assert_eq!(succeeded.len(), 3);
    assert!(succeeded.iter().all(|r| r.attempts == 1));
    assert_eq!(backend.call_count(), 3);
    assert_eq!(pipeline.queue().queued_len().await, 0);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_marks_permanent() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs").fail_times(100));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .with_engine_config(EngineConfig::default().with_max_attempts(3))
        .build();

    let mut feed = OnePage(Some(vec![doc("manuals/flaky.pdf", "etag-f")]));
    pipeline.ingest(&mut feed).await.unwrap();

    // Each cycle burns one attempt; the queue converts the record once the
    // budget is gone and later cycles find nothing to claim.
    for _ in 0..5 {
        if pipeline.run_once().await.unwrap() == 0 {
            break;
        }
    }

    let failed = store
        .list_by_state(ProcessingState::FailedPermanent)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 3);
    assert!(failed[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("attempt budget exhausted"));
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn test_resubmitted_document_is_served_from_cache() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs"));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .build();

    let mut feed = OnePage(Some(vec![doc("manuals/pump.pdf", "etag-1")]));
    pipeline.ingest(&mut feed).await.unwrap();
    pipeline.run_once().await.unwrap();
    assert_eq!(backend.call_count(), 1);

    // Force a reprocessing pass for the identical content.
    let mut record = store
        .list_by_state(ProcessingState::Succeeded)
        .await
        .unwrap()
        .remove(0);
    record.state = ProcessingState::Discovered;
    record.attempts = 0;
    store.upsert(&record).await.unwrap();
    pipeline.queue().enqueue(&record).await.unwrap();

    pipeline.run_once().await.unwrap();

    // Same fingerprint, same backend: no second extraction call.
    assert_eq!(backend.call_count(), 1);
    let stats = pipeline.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(
        store
            .list_by_state(ProcessingState::Succeeded)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_breaker_opens_then_recovers_across_cycles() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs").fail_times(2));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .with_engine_config(
            EngineConfig::default()
                .with_max_concurrent(1)
                .with_breaker(BreakerConfig {
                    failure_threshold: 2,
                    base_backoff: Duration::from_millis(100),
                    max_backoff: Duration::from_millis(400),
                }),
        )
        .build();

    let mut feed = OnePage(Some(docs(5)));
    pipeline.ingest(&mut feed).await.unwrap();

    // First cycle: two real failures open the breaker, the remaining three
    // documents are short-circuited without touching the backend.
    assert_eq!(pipeline.run_once().await.unwrap(), 5);
    assert_eq!(backend.call_count(), 2);
    assert_eq!(pipeline.queue().queued_len().await, 5);

    // After the cooldown the probe succeeds, the breaker closes, and the
    // whole batch drains.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pipeline.run_once().await.unwrap(), 5);
    assert_eq!(backend.call_count(), 7);
    assert_eq!(
        store
            .list_by_state(ProcessingState::Succeeded)
            .await
            .unwrap()
            .len(),
        5
    );
}

#[tokio::test]
async fn test_unreachable_webhook_does_not_fail_processing() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs"));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend)
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .with_notifier(WebhookNotifier::new("http://192.0.2.1:9/hook"))
        .build();

    let mut feed = OnePage(Some(docs(2)));
    pipeline.ingest(&mut feed).await.unwrap();
    assert_eq!(pipeline.run_once().await.unwrap(), 2);

    assert_eq!(
        store
            .list_by_state(ProcessingState::Succeeded)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_started_pipeline_drains_queue_and_shuts_down() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs"));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .with_pipeline_config(PipelineConfig::default().with_poll_interval(20))
        .build();

    let mut feed = OnePage(Some(docs(4)));
    pipeline.ingest(&mut feed).await.unwrap();

    let handle = pipeline.start();

    // Poll the store until the loop has drained everything.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let done = store
            .list_by_state(ProcessingState::Succeeded)
            .await
            .unwrap()
            .len();
        if done == 4 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pipeline did not drain the queue in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.shutdown().await.unwrap();
    assert_eq!(backend.call_count(), 4);
}

#[tokio::test]
async fn test_paused_pipeline_claims_nothing_until_resumed() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs"));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend.clone())
        .build();

    let pipeline = Pipeline::builder(store.clone())
        .with_registry(registry)
        .with_pipeline_config(PipelineConfig::default().with_poll_interval(20))
        .build();
    let queue = pipeline.queue().clone();

    let handle = pipeline.start();
    handle.pause();
    assert!(handle.is_paused());

    queue.enqueue(&doc("manuals/parked.pdf", "etag-p")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Idling: the queued document is untouched.
    assert_eq!(backend.call_count(), 0);
    assert_eq!(queue.queued_len().await, 1);

    handle.resume();
    assert!(!handle.is_paused());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store
        .list_by_state(ProcessingState::Succeeded)
        .await
        .unwrap()
        .is_empty()
    {
        assert!(
            tokio::time::Instant::now() < deadline,
            "pipeline did not resume processing"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(backend.call_count(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_once_surfaces_state_machine_violations() {
    let store = Arc::new(MemoryDocumentStore::new());
    let backend = Arc::new(MockBackend::new("datalabs").with_latency(Duration::from_millis(200)));
    let registry = ProcessorRegistry::builder()
        .with_backend(DocumentType::Manual, backend)
        .build();

    let pipeline = Arc::new(
        Pipeline::builder(store.clone())
            .with_registry(registry)
            .build(),
    );

    let mut feed = OnePage(Some(vec![doc("manuals/tampered.pdf", "etag-t")]));
    pipeline.ingest(&mut feed).await.unwrap();

    let runner = pipeline.clone();
    let cycle = tokio::spawn(async move { runner.run_once().await });

    // While extraction is in flight, rewind the record behind the queue's
    // back. Recording the outcome then violates the state machine, which a
    // batch cycle must report instead of swallowing.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let in_progress = store
            .list_by_state(ProcessingState::InProgress)
            .await
            .unwrap();
        if let Some(mut record) = in_progress.into_iter().next() {
            record.state = ProcessingState::Discovered;
            store.upsert(&record).await.unwrap();
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "document never entered processing"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let result = cycle.await.unwrap();
    assert!(matches!(result, Err(Error::InvalidState { .. })));
}
