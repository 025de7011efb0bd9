//! Engine configuration.
//!
//! All recognized options can be supplied programmatically through the
//! builder-style setters or read from the environment via [`EngineConfig::from_env`].

use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Cooldown after the breaker first opens.
    pub base_backoff: Duration,
    /// Cap on the exponentially growing cooldown.
    pub max_backoff: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            base_backoff: Duration::from_secs(defaults::BREAKER_BASE_BACKOFF_SECS),
            max_backoff: Duration::from_secs(defaults::BREAKER_MAX_BACKOFF_SECS),
        }
    }
}

/// Result cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Bounds memory by evicting least-recently-used entries.
    pub max_entries: usize,
    /// Entries older than this are treated as absent.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: defaults::CACHE_MAX_ENTRIES,
            ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
        }
    }
}

/// Configuration surface consumed by the processing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on simultaneous in-flight extractions.
    pub max_concurrent: usize,
    /// Per-document attempt budget before permanent failure.
    pub max_attempts: u32,
    /// Per-call extraction timeout.
    pub extract_timeout: Duration,
    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::MAX_CONCURRENT,
            max_attempts: defaults::MAX_ATTEMPTS,
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
            breaker: BreakerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DOCPIPE_MAX_CONCURRENT` | `3` | Max simultaneous extraction calls |
    /// | `DOCPIPE_MAX_ATTEMPTS` | `3` | Attempt budget per document |
    /// | `DOCPIPE_EXTRACT_TIMEOUT_SECS` | `300` | Per-call extraction timeout |
    /// | `DOCPIPE_BREAKER_FAILURE_THRESHOLD` | `5` | Failures before a backend opens |
    /// | `DOCPIPE_BREAKER_BASE_BACKOFF_SECS` | `60` | Initial open cooldown |
    /// | `DOCPIPE_BREAKER_MAX_BACKOFF_SECS` | `900` | Cooldown growth cap |
    /// | `DOCPIPE_CACHE_MAX_ENTRIES` | `1000` | LRU bound on cached results |
    /// | `DOCPIPE_CACHE_TTL_SECS` | `604800` | Cache entry time-to-live |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("DOCPIPE_MAX_CONCURRENT") {
            config.max_concurrent = v.max(1);
        }
        if let Some(v) = env_parse::<u32>("DOCPIPE_MAX_ATTEMPTS") {
            config.max_attempts = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("DOCPIPE_EXTRACT_TIMEOUT_SECS") {
            config.extract_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("DOCPIPE_BREAKER_FAILURE_THRESHOLD") {
            config.breaker.failure_threshold = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("DOCPIPE_BREAKER_BASE_BACKOFF_SECS") {
            config.breaker.base_backoff = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("DOCPIPE_BREAKER_MAX_BACKOFF_SECS") {
            config.breaker.max_backoff = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("DOCPIPE_CACHE_MAX_ENTRIES") {
            config.cache.max_entries = v;
        }
        if let Some(v) = env_parse::<u64>("DOCPIPE_CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(v);
        }

        config
    }

    /// Set the maximum simultaneous extractions.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the per-document attempt budget.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the per-call extraction timeout.
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    /// Set breaker tuning.
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Set cache tuning.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(Error::Config(
                "breaker failure_threshold must be at least 1".into(),
            ));
        }
        if self.breaker.max_backoff < self.breaker.base_backoff {
            return Err(Error::Config(
                "breaker max_backoff must not be below base_backoff".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}
