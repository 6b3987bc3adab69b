//! Per-kind operation counters.
//!
//! Lock-free atomic counters incremented along the pipeline and exposed as
//! a point-in-time [`MetricsSnapshot`]. Counters label outcomes only; they
//! never carry request content.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::core::response::RouteDecision;
use crate::error::Error;

/// Atomic counters owned by the core.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    static_responses: AtomicU64,
    hybrid_responses: AtomicU64,
    dynamic_responses: AtomicU64,
    cache_hits: AtomicU64,
    throttled: AtomicU64,
    bad_input: AtomicU64,
    file_denied: AtomicU64,
    template_errors: AtomicU64,
    generation_errors: AtomicU64,
    generation_timeouts: AtomicU64,
    breaker_short_circuits: AtomicU64,
    unsafe_outputs: AtomicU64,
    unavailable: AtomicU64,
    internal_errors: AtomicU64,
    redactions: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that entered the pipeline.
    pub requests: u64,
    /// Successful responses served from the static bank.
    pub static_responses: u64,
    /// Successful hybrid responses.
    pub hybrid_responses: u64,
    /// Successful dynamic responses.
    pub dynamic_responses: u64,
    /// Responses served from the cache.
    pub cache_hits: u64,
    /// Requests rejected by the rate limiter.
    pub throttled: u64,
    /// Requests rejected by the input validator.
    pub bad_input: u64,
    /// Workspace reads denied by the access controller.
    pub file_denied: u64,
    /// Template rendering failures.
    pub template_errors: u64,
    /// Generative host failures.
    pub generation_errors: u64,
    /// Generative calls that hit their timeout.
    pub generation_timeouts: u64,
    /// Calls short-circuited by the open breaker.
    pub breaker_short_circuits: u64,
    /// Responses withheld by the output safety check.
    pub unsafe_outputs: u64,
    /// Requests that ended unavailable.
    pub unavailable: u64,
    /// Internal invariant failures.
    pub internal_errors: u64,
    /// Total redactions applied across all requests.
    pub redactions: u64,
}

impl Metrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request entering the pipeline.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a successful response by route.
    pub fn record_route(&self, route: RouteDecision) {
        let counter = match route {
            RouteDecision::Static => &self.static_responses,
            RouteDecision::Hybrid => &self.hybrid_responses,
            RouteDecision::Dynamic => &self.dynamic_responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a cache-served response.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a breaker short-circuit.
    pub fn record_breaker_short(&self) {
        self.breaker_short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the total redaction count.
    pub fn record_redactions(&self, count: usize) {
        self.redactions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Counts a surfaced error by kind.
    pub fn record_error(&self, error: &Error) {
        let counter = match error {
            Error::Throttled { .. } => &self.throttled,
            Error::BadInput(_) => &self.bad_input,
            Error::FileDenied(_) => &self.file_denied,
            Error::Template(_) => &self.template_errors,
            Error::Generation(e) => match e {
                crate::error::GenerationError::Timeout { .. } => &self.generation_timeouts,
                _ => &self.generation_errors,
            },
            Error::Unsafe { .. } => &self.unsafe_outputs,
            // Responses withheld for leaking secrets surface as
            // unavailable(unsafe); count them with the safety failures.
            Error::Unavailable {
                reason: crate::error::UnavailableReason::UnsafeOutput,
            } => &self.unsafe_outputs,
            Error::Unavailable { .. } => &self.unavailable,
            Error::Internal { .. } => &self.internal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            static_responses: self.static_responses.load(Ordering::Relaxed),
            hybrid_responses: self.hybrid_responses.load(Ordering::Relaxed),
            dynamic_responses: self.dynamic_responses.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            bad_input: self.bad_input.load(Ordering::Relaxed),
            file_denied: self.file_denied.load(Ordering::Relaxed),
            template_errors: self.template_errors.load(Ordering::Relaxed),
            generation_errors: self.generation_errors.load(Ordering::Relaxed),
            generation_timeouts: self.generation_timeouts.load(Ordering::Relaxed),
            breaker_short_circuits: self.breaker_short_circuits.load(Ordering::Relaxed),
            unsafe_outputs: self.unsafe_outputs.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            redactions: self.redactions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, InputError};

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.throttled, 0);
        assert_eq!(snapshot.redactions, 0);
    }

    #[test]
    fn test_route_counters() {
        let metrics = Metrics::new();
        metrics.record_route(RouteDecision::Static);
        metrics.record_route(RouteDecision::Dynamic);
        metrics.record_route(RouteDecision::Dynamic);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.static_responses, 1);
        assert_eq!(snapshot.hybrid_responses, 0);
        assert_eq!(snapshot.dynamic_responses, 2);
    }

    #[test]
    fn test_error_kinds_land_in_distinct_counters() {
        let metrics = Metrics::new();
        metrics.record_error(&Error::Throttled { retry_after_ms: 1 });
        metrics.record_error(&InputError::EmptyQuery.into());
        metrics.record_error(&GenerationError::Timeout { elapsed_ms: 1 }.into());
        metrics.record_error(&GenerationError::Host("x".to_string()).into());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.throttled, 1);
        assert_eq!(snapshot.bad_input, 1);
        assert_eq!(snapshot.generation_timeouts, 1);
        assert_eq!(snapshot.generation_errors, 1);
    }

    #[test]
    fn test_redactions_accumulate() {
        let metrics = Metrics::new();
        metrics.record_redactions(2);
        metrics.record_redactions(3);
        assert_eq!(metrics.snapshot().redactions, 5);
    }
}
