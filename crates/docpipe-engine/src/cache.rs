//! Content-addressed cache of extraction results.
//!
//! Avoids re-invoking expensive extraction backends for unchanged content:
//! the key covers the document's content fingerprint, its declared type, and
//! the backend id, so any content change invalidates implicitly via key
//! mismatch.
//!
//! This implementation is in-memory only. A process restart clears it, which
//! affects cost (documents re-extract once) but never correctness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use docpipe_core::config::CacheConfig;
use docpipe_core::models::{DocumentType, ExtractionResult};

/// Cache key: (content fingerprint, document type, backend identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub doc_type: DocumentType,
    pub backend_id: String,
}

impl CacheKey {
    pub fn new(
        fingerprint: impl Into<String>,
        doc_type: DocumentType,
        backend_id: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            doc_type,
            backend_id: backend_id.into(),
        }
    }

    /// Stable hex digest of the key components.
    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint.as_bytes());
        hasher.update(self.doc_type.as_str().as_bytes());
        hasher.update(self.backend_id.as_bytes());
        let hash = hex::encode(hasher.finalize());
        hash[..16].to_string()
    }
}

struct CacheEntry {
    payload: ExtractionResult,
    created_at: Instant,
    /// Monotone counter for least-recently-used ordering.
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    use_counter: u64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memo of prior extraction outputs, safe for concurrent batch items.
pub struct ResultCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                use_counter: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached payload for `key`, or `None`. Absence is not an error; entries
    /// past their TTL are treated as absent and dropped.
    pub fn get(&self, key: &CacheKey) -> Option<ExtractionResult> {
        let digest = key.digest();
        let mut inner = self.inner.lock().unwrap();

        let expired = matches!(
            inner.entries.get(&digest),
            Some(entry) if entry.created_at.elapsed() > self.config.ttl
        );
        if expired {
            debug!(fingerprint = %key.fingerprint, "Cache entry expired");
            inner.entries.remove(&digest);
        }

        inner.use_counter += 1;
        let counter = inner.use_counter;
        if let Some(entry) = inner.entries.get_mut(&digest) {
            entry.last_used = counter;
            let payload = entry.payload.clone();
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %key.fingerprint, backend = %key.backend_id, "Cache hit");
            Some(payload)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %key.fingerprint, backend = %key.backend_id, "Cache miss");
            None
        }
    }

    /// Store or overwrite the result for `key`, evicting the least-recently
    /// used entry when the configured bound is exceeded.
    pub fn put(&self, key: &CacheKey, payload: ExtractionResult) {
        let digest = key.digest();
        let mut inner = self.inner.lock().unwrap();
        inner.use_counter += 1;
        let counter = inner.use_counter;
        inner.entries.insert(
            digest,
            CacheEntry {
                payload,
                created_at: Instant::now(),
                last_used: counter,
            },
        );

        while self.config.max_entries > 0 && inner.entries.len() > self.config.max_entries {
            let lru = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match lru {
                Some(k) => {
                    inner.entries.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_config(max_entries: usize, ttl: Duration) -> CacheConfig {
        CacheConfig { max_entries, ttl }
    }

    fn result(backend: &str) -> ExtractionResult {
        ExtractionResult {
            extracted_text: Some("pump maintenance schedule".into()),
            payload: json!({"pages": 3}),
            backend: backend.into(),
        }
    }

    #[test]
    fn test_round_trip() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        let key = CacheKey::new("etag-1", DocumentType::Manual, "datalabs");

        assert!(cache.get(&key).is_none());
        cache.put(&key, result("datalabs"));
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.backend, "datalabs");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_differing_fingerprint_never_hits() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        cache.put(
            &CacheKey::new("etag-1", DocumentType::Manual, "datalabs"),
            result("datalabs"),
        );
        assert!(cache
            .get(&CacheKey::new("etag-2", DocumentType::Manual, "datalabs"))
            .is_none());
    }

    #[test]
    fn test_key_covers_type_and_backend() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        cache.put(
            &CacheKey::new("etag-1", DocumentType::Manual, "datalabs"),
            result("datalabs"),
        );
        assert!(cache
            .get(&CacheKey::new("etag-1", DocumentType::Diagram, "datalabs"))
            .is_none());
        assert!(cache
            .get(&CacheKey::new("etag-1", DocumentType::Manual, "pymupdf"))
            .is_none());
    }

    #[test]
    fn test_overwrite_replaces() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        let key = CacheKey::new("etag-1", DocumentType::Manual, "datalabs");
        cache.put(&key, result("datalabs"));
        let mut updated = result("datalabs");
        updated.extracted_text = Some("revised".into());
        cache.put(&key, updated);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().extracted_text.as_deref(), Some("revised"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_treated_as_absent() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        let key = CacheKey::new("etag-1", DocumentType::Manual, "datalabs");
        cache.put(&key, result("datalabs"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&key).is_none());
        // The expired entry was dropped, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = ResultCache::new(cache_config(2, Duration::from_secs(60)));
        let k1 = CacheKey::new("etag-1", DocumentType::Manual, "datalabs");
        let k2 = CacheKey::new("etag-2", DocumentType::Manual, "datalabs");
        let k3 = CacheKey::new("etag-3", DocumentType::Manual, "datalabs");

        cache.put(&k1, result("datalabs"));
        cache.put(&k2, result("datalabs"));
        // Touch k1 so k2 becomes the least recently used.
        cache.get(&k1).unwrap();
        cache.put(&k3, result("datalabs"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::new(cache_config(10, Duration::from_secs(60)));
        cache.put(
            &CacheKey::new("etag-1", DocumentType::Manual, "datalabs"),
            result("datalabs"),
        );
        cache.clear();
        assert!(cache.is_empty());
    }
}
