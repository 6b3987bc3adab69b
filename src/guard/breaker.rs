//! Circuit breaker for the generative path.
//!
//! A three-state machine: `CLOSED` counts consecutive failures and opens at
//! the threshold; `OPEN` short-circuits calls until the recovery timeout;
//! `HALF_OPEN` admits a bounded number of probes and closes again once
//! enough of them succeed. Any probe failure reopens the breaker.
//!
//! State transitions are serialized behind one mutex; the guarded future
//! itself runs outside the lock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls are short-circuited until the recovery timeout elapses.
    Open,
    /// A bounded number of probe calls test host health.
    HalfOpen,
}

impl BreakerState {
    /// Returns the stable label for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of breaker health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures observed while closed.
    pub consecutive_failures: u32,
    /// Successful probes observed while half-open.
    pub probe_successes: u32,
    /// How long the breaker has been in its current state.
    pub time_in_state: Duration,
}

/// Error surface of a guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The call was short-circuited without invoking the callable.
    Open {
        /// Milliseconds until the breaker will admit a probe; zero when
        /// probes are already in flight.
        retry_in_ms: u64,
    },
    /// The callable ran and failed; the failure was counted.
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    probe_successes: u32,
    probes_in_flight: u32,
    entered_at: Instant,
}

/// Guards an unreliable callable and fails fast under sustained errors.
///
/// # Examples
///
/// ```
/// use mentor_rs::guard::{BreakerError, CircuitBreaker};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = CircuitBreaker::new(1, Duration::from_secs(60), 2, 3);
/// let failed: Result<(), _> = breaker.call(async { Err::<(), _>("boom") }).await;
/// assert!(matches!(failed, Err(BreakerError::Inner("boom"))));
///
/// // The threshold was 1, so the breaker is now open.
/// let short: Result<(), _> = breaker.call(async { Ok::<(), &str>(()) }).await;
/// assert!(matches!(short, Err(BreakerError::Open { .. })));
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    probe_required: u32,
    probe_capacity: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given policy.
    #[must_use]
    pub fn new(
        failure_threshold: u32,
        recovery_timeout: Duration,
        probe_required: u32,
        probe_capacity: u32,
    ) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            probe_required: probe_required.max(1),
            probe_capacity: probe_capacity.max(probe_required).max(1),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                probes_in_flight: 0,
                entered_at: Instant::now(),
            }),
        }
    }

    /// Runs `fut` under the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without running `fut` when the breaker
    /// is open, or [`BreakerError::Inner`] when `fut` itself fails (the
    /// failure is counted toward the breaker).
    pub async fn call<T, E, F>(&self, fut: F) -> std::result::Result<T, BreakerError<E>>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let probing = match self.try_acquire(Instant::now()) {
            Ok(probing) => probing,
            Err(retry_in_ms) => return Err(BreakerError::Open { retry_in_ms }),
        };

        match fut.await {
            Ok(value) => {
                self.on_success(probing);
                Ok(value)
            }
            Err(error) => {
                self.on_failure(probing, Instant::now());
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Returns the current state, counters, and time in state.
    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            probe_successes: inner.probe_successes,
            time_in_state: inner.entered_at.elapsed(),
        }
    }

    /// Whether a call right now would be short-circuited.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        inner.state == BreakerState::Open
            && inner.entered_at.elapsed() < self.recovery_timeout
    }

    /// Admits the call or reports how long until a probe is possible.
    /// Returns whether the admitted call is a half-open probe.
    fn try_acquire(&self, now: Instant) -> std::result::Result<bool, u64> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => {
                let elapsed = now.saturating_duration_since(inner.entered_at);
                if elapsed >= self.recovery_timeout {
                    info!(state = "half_open", "breaker admitting probes");
                    inner.state = BreakerState::HalfOpen;
                    inner.entered_at = now;
                    inner.probe_successes = 0;
                    inner.probes_in_flight = 1;
                    Ok(true)
                } else {
                    let remaining = self.recovery_timeout - elapsed;
                    #[allow(clippy::cast_possible_truncation)]
                    let retry_in_ms = remaining.as_millis().min(u128::from(u64::MAX)) as u64;
                    Err(retry_in_ms.max(1))
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < self.probe_capacity {
                    inner.probes_in_flight += 1;
                    Ok(true)
                } else {
                    Err(0)
                }
            }
        }
    }

    fn on_success(&self, probing: bool) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                if probing {
                    inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                    inner.probe_successes += 1;
                    if inner.probe_successes >= self.probe_required {
                        info!(state = "closed", "breaker recovered");
                        inner.state = BreakerState::Closed;
                        inner.entered_at = Instant::now();
                        inner.consecutive_failures = 0;
                        inner.probe_successes = 0;
                        inner.probes_in_flight = 0;
                    }
                }
            }
            // A success landing after the breaker reopened is stale; drop it.
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, probing: bool, now: Instant) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    info!(
                        state = "open",
                        failures = inner.consecutive_failures,
                        "breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.entered_at = now;
                }
            }
            BreakerState::HalfOpen => {
                if probing {
                    info!(state = "open", "probe failed, breaker reopened");
                    inner.state = BreakerState::Open;
                    inner.entered_at = now;
                    inner.probe_successes = 0;
                    inner.probes_in_flight = 0;
                }
            }
            BreakerState::Open => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
