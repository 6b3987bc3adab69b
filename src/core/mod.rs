//! Core domain types for the mentor pipeline.
//!
//! Requests, responses, the RPC-style envelope, and the normalized query
//! produced by validation. Long-lived state (caches, buckets, breaker)
//! lives with [`crate::router::MentorCore`]; everything here is
//! per-request and dies with the request.

pub mod envelope;
pub mod normalized;
pub mod request;
pub mod response;

pub use envelope::{QueryEnvelope, QueryReply, QueryStatus};
pub use normalized::NormalizedQuery;
pub use request::{FileReference, Intent, MentorRequest, Quality, RequestFlags};
pub use response::{MentorResponse, RouteDecision, RouteReason};
