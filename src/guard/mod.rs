//! Admission and failure guards.
//!
//! Two stateful protections owned by the core: the per-caller token-bucket
//! rate limiter that admits requests, and the circuit breaker that guards
//! the generative path against sustained host failures.

pub mod breaker;
pub mod limiter;

pub use breaker::{BreakerError, BreakerState, BreakerStatus, CircuitBreaker};
pub use limiter::{Admission, RateLimiter};
