//! Per-backend circuit breaker guarding calls to extraction services.
//!
//! Prevents repeated calls to a backend that is currently failing and probes
//! for recovery with a single trial call per cooldown, so a recovering
//! service is never hit by a thundering herd.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use docpipe_core::config::BreakerConfig;
use docpipe_core::error::{Error, Result};

/// Circuit breaker mode for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitMode {
    /// Normal operation.
    Closed,
    /// Failing, blocking requests until the cooldown elapses.
    Open,
    /// Cooldown elapsed, one probe call allowed through.
    HalfOpen,
}

/// Point-in-time view of one backend's breaker, for dashboards and logs.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub backend: String,
    pub mode: CircuitMode,
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
    pub current_backoff: Duration,
}

struct BackendState {
    mode: CircuitMode,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    /// Cooldown applied on the next transition to open. Doubles per open
    /// period up to the configured cap, resets to base on close.
    current_backoff: Duration,
    /// True while the single half-open trial call is outstanding.
    probe_in_flight: bool,
}

impl BackendState {
    fn new(config: &BreakerConfig) -> Self {
        Self {
            mode: CircuitMode::Closed,
            consecutive_failures: 0,
            open_until: None,
            current_backoff: config.base_backoff,
            probe_in_flight: false,
        }
    }
}

/// Releases the half-open probe slot if the probe future is dropped before
/// it completes, e.g. when a batch task is aborted mid-call.
struct ProbeSlot {
    state: Arc<Mutex<BackendState>>,
    armed: bool,
}

impl ProbeSlot {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut guard) = self.state.lock() {
            if guard.mode == CircuitMode::HalfOpen && guard.probe_in_flight {
                guard.probe_in_flight = false;
            }
        }
    }
}

/// Failure-rate guard for unreliable extraction backends.
///
/// State is independent per backend id; transitions for the same backend
/// serialize through that backend's own lock, so unrelated backends never
/// contend. The breaker performs no I/O of its own.
pub struct CircuitBreaker {
    config: BreakerConfig,
    backends: Mutex<HashMap<String, Arc<Mutex<BackendState>>>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            backends: Mutex::new(HashMap::new()),
        }
    }

    /// Invoke `op` under breaker protection for `backend_id`.
    ///
    /// Fails fast with [`Error::CircuitOpen`] (without invoking `op`) while
    /// the backend is open and the cooldown has not elapsed. Once it has,
    /// exactly one caller is admitted as a probe; its success closes the
    /// breaker, its failure re-opens immediately with the next backoff step.
    pub async fn call<F, Fut, T>(&self, backend_id: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let state = self.backend_state(backend_id);
        let probing = self.admit(backend_id, &state)?;
        // If the probe future is dropped before completing, the guard frees
        // the slot so the backend is not stuck rejecting forever.
        let mut probe_slot = probing.then(|| ProbeSlot {
            state: state.clone(),
            armed: true,
        });

        let result = op().await;
        if let Some(slot) = probe_slot.take() {
            slot.disarm();
        }
        match &result {
            Ok(_) => self.record_success(backend_id, &state),
            Err(e) => self.record_failure(backend_id, &state, e),
        }
        result
    }

    /// Current mode for a backend. Backends never called report `Closed`.
    pub fn mode(&self, backend_id: &str) -> CircuitMode {
        let state = self.backend_state(backend_id);
        let guard = state.lock().unwrap();
        guard.mode
    }

    /// Snapshot of one backend's breaker state.
    pub fn snapshot(&self, backend_id: &str) -> BreakerSnapshot {
        let state = self.backend_state(backend_id);
        let guard = state.lock().unwrap();
        BreakerSnapshot {
            backend: backend_id.to_string(),
            mode: guard.mode,
            consecutive_failures: guard.consecutive_failures,
            open_until: guard.open_until,
            current_backoff: guard.current_backoff,
        }
    }

    /// Manually reset a backend's breaker to closed.
    pub fn reset(&self, backend_id: &str) {
        let state = self.backend_state(backend_id);
        let mut guard = state.lock().unwrap();
        *guard = BackendState::new(&self.config);
        info!(backend = backend_id, "Circuit breaker manually reset");
    }

    fn backend_state(&self, backend_id: &str) -> Arc<Mutex<BackendState>> {
        let mut map = self.backends.lock().unwrap();
        map.entry(backend_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BackendState::new(&self.config))))
            .clone()
    }

    /// Decide whether a call may proceed, transitioning open -> half-open
    /// when the cooldown has elapsed. Returns `true` when the admitted call
    /// is the half-open probe.
    fn admit(&self, backend_id: &str, state: &Mutex<BackendState>) -> Result<bool> {
        let mut guard = state.lock().unwrap();
        match guard.mode {
            CircuitMode::Closed => Ok(false),
            CircuitMode::Open => {
                let elapsed = guard
                    .open_until
                    .map(|deadline| Instant::now() >= deadline)
                    .unwrap_or(true);
                if elapsed {
                    guard.mode = CircuitMode::HalfOpen;
                    guard.probe_in_flight = true;
                    info!(backend = backend_id, "Circuit breaker half-open, probing");
                    Ok(true)
                } else {
                    warn!(backend = backend_id, "Circuit breaker open, blocking call");
                    Err(Error::CircuitOpen {
                        backend: backend_id.to_string(),
                    })
                }
            }
            CircuitMode::HalfOpen => {
                if guard.probe_in_flight {
                    Err(Error::CircuitOpen {
                        backend: backend_id.to_string(),
                    })
                } else {
                    guard.probe_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn record_success(&self, backend_id: &str, state: &Mutex<BackendState>) {
        let mut guard = state.lock().unwrap();
        guard.consecutive_failures = 0;
        if guard.mode == CircuitMode::HalfOpen {
            guard.mode = CircuitMode::Closed;
            guard.open_until = None;
            guard.probe_in_flight = false;
            guard.current_backoff = self.config.base_backoff;
            info!(backend = backend_id, "Circuit breaker closed after successful probe");
        }
    }

    fn record_failure(&self, backend_id: &str, state: &Mutex<BackendState>, err: &Error) {
        let mut guard = state.lock().unwrap();
        guard.consecutive_failures += 1;
        debug!(
            backend = backend_id,
            consecutive_failures = guard.consecutive_failures,
            error = %err,
            "Circuit breaker recorded failure"
        );

        let should_open = match guard.mode {
            // No partial credit for a failed probe: re-open immediately.
            CircuitMode::HalfOpen => true,
            CircuitMode::Closed => guard.consecutive_failures >= self.config.failure_threshold,
            CircuitMode::Open => false,
        };

        if should_open {
            let backoff = guard.current_backoff;
            guard.mode = CircuitMode::Open;
            guard.open_until = Some(Instant::now() + backoff);
            guard.probe_in_flight = false;
            guard.current_backoff =
                (guard.current_backoff * 2).min(self.config.max_backoff);
            error!(
                backend = backend_id,
                consecutive_failures = guard.consecutive_failures,
                backoff_secs = backoff.as_secs(),
                "Circuit breaker opened"
            );
        }
    }
}
