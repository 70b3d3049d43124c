//! Per-provider circuit breakers.
//!
//! Each named outbound operation gets a closed/open/half-open state machine
//! with a sliding window of timestamped outcomes. A call that outlives the
//! per-call timeout counts as a failure and is classified `timeout`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting requests after excessive errors.
    Open,
    /// Allowing a single probe to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by a guarded call.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without invoking the operation.
    #[error("Circuit open")]
    Open,

    /// The operation exceeded the per-call timeout.
    #[error("Call timed out")]
    Timeout,

    /// The operation itself failed.
    #[error(transparent)]
    Inner(E),
}

/// Timestamped request outcomes within a sliding window.
///
/// Old entries are pruned when the error rate is read, so a short burst of
/// errors ages out instead of tripping the breaker forever.
struct OutcomeWindow {
    outcomes: Vec<(Instant, bool)>,
    window: Duration,
}

impl OutcomeWindow {
    fn new(window: Duration) -> Self {
        Self {
            outcomes: Vec::new(),
            window,
        }
    }

    fn prune(&mut self) {
        let cutoff = Instant::now() - self.window;
        self.outcomes.retain(|(at, _)| *at > cutoff);
    }

    fn record(&mut self, success: bool) {
        self.prune();
        self.outcomes.push((Instant::now(), success));
    }

    fn total(&self) -> u32 {
        self.outcomes.len() as u32
    }

    fn failure_rate_pct(&self) -> u8 {
        let total = self.outcomes.len();
        if total == 0 {
            return 0;
        }
        let failed = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        ((failed * 100) / total) as u8
    }

    fn reset(&mut self) {
        self.outcomes.clear();
    }
}

struct BreakerState {
    state: CircuitState,
    window: OutcomeWindow,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// A named circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let window = config.window();
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                window: OutcomeWindow::new(window),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, advancing open → half-open when the reset timeout has
    /// elapsed.
    pub fn state(&self) -> CircuitState {
        let mut guard = self.lock_state();
        self.advance_if_reset_elapsed(&mut guard);
        guard.state
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // A poisoned breaker mutex means a panic mid-bookkeeping; the data
        // is plain counters, safe to keep using.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance_if_reset_elapsed(&self, guard: &mut BreakerState) {
        if guard.state == CircuitState::Open {
            let elapsed = guard
                .opened_at
                .map(|at| at.elapsed() >= self.config.reset_timeout())
                .unwrap_or(true);
            if elapsed {
                info!(breaker = %self.name, "Circuit half-open, allowing probe");
                guard.state = CircuitState::HalfOpen;
                guard.probe_in_flight = false;
            }
        }
    }

    /// Decide whether this call may proceed.
    fn try_acquire(&self) -> Result<(), ()> {
        let mut guard = self.lock_state();
        self.advance_if_reset_elapsed(&mut guard);

        match guard.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(()),
            CircuitState::HalfOpen => {
                if guard.probe_in_flight {
                    Err(())
                } else {
                    guard.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut guard = self.lock_state();
        match guard.state {
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Probe succeeded, closing circuit");
                guard.state = CircuitState::Closed;
                guard.window.reset();
                guard.opened_at = None;
                guard.probe_in_flight = false;
            }
            _ => guard.window.record(true),
        }
    }

    fn record_failure(&self) {
        let mut guard = self.lock_state();
        match guard.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Probe failed, reopening circuit");
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
                guard.probe_in_flight = false;
            }
            CircuitState::Open => {}
            CircuitState::Closed => {
                guard.window.record(false);
                guard.window.prune();
                if guard.window.total() >= self.config.volume_threshold
                    && guard.window.failure_rate_pct() >= self.config.error_threshold_pct
                {
                    warn!(
                        breaker = %self.name,
                        failure_rate_pct = guard.window.failure_rate_pct(),
                        "Error threshold exceeded, opening circuit"
                    );
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
        }
    }

    /// Run `op` under the breaker with the configured per-call timeout.
    pub async fn call<F, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if self.try_acquire().is_err() {
            warn!(breaker = %self.name, outcome = "rejected", "Circuit open, call rejected");
            return Err(BreakerError::Open);
        }

        match tokio::time::timeout(self.config.call_timeout(), op).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(breaker = %self.name, outcome = "error", "Guarded call failed");
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                warn!(breaker = %self.name, outcome = "timeout", "Guarded call timed out");
                self.record_failure();
                Err(BreakerError::Timeout)
            }
        }
    }

    /// Like [`call`](Self::call), but substitute a fallback value on
    /// rejection and on failure. The fallback never closes the breaker.
    pub async fn call_with_fallback<F, T, E, FB>(&self, op: F, fallback: FB) -> T
    where
        F: Future<Output = Result<T, E>>,
        FB: FnOnce(BreakerError<E>) -> T,
    {
        match self.call(op).await {
            Ok(value) => value,
            Err(e) => fallback(e),
        }
    }
}

/// Name → breaker map shared across services.
#[derive(Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch or create the breaker for a named operation.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(found) = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return found.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    /// Names of breakers currently rejecting traffic.
    pub fn open_breakers(&self) -> Vec<String> {
        let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
        let mut open: Vec<String> = breakers
            .values()
            .filter(|b| b.state() == CircuitState::Open)
            .map(|b| b.name().to_string())
            .collect();
        open.sort();
        open
    }
}

#[cfg(test)]
mod tests;
