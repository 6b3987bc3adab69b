//! # mentor-rs
//!
//! Hybrid static/generative mentor response core.
//!
//! mentor-rs answers engineering queries — architectural proposals, PR and
//! issue excerpts, code snippets — with persona-grounded advice, deciding
//! per request between a cheap pre-authored response and a guarded call to
//! an external generative host.
//!
//! ## Features
//!
//! - **Hybrid Routing**: confidence-scored choice between static, hybrid,
//!   and dynamic responses with mandatory relevance gating
//! - **Safety Pipeline**: secret redaction, input validation, prompt
//!   injection screening, sandboxed templates, confined workspace reads
//! - **Resilience**: per-caller token buckets, a TTL+LRU response cache,
//!   and a circuit breaker around the generative path

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod bank;
pub mod cache;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod prompt;
pub mod router;
pub mod sanitize;
pub mod scoring;
pub mod template;
pub mod workspace;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    MentorRequest, MentorResponse, NormalizedQuery, QueryEnvelope, QueryReply, QueryStatus,
    RouteDecision, RouteReason,
};

// Re-export the long-lived core
pub use router::MentorCore;

// Re-export configuration types
pub use config::{ConfigHandle, MentorConfig, WorkspaceConfig};

// Re-export the generative seam
pub use client::{AssembledPrompt, GenerationBudget, GenerativeBackend, OpenAiBackend};

// Re-export sanitization types
pub use sanitize::{InputValidator, ScanOutcome, SecretScanner};

// Re-export guard types
pub use guard::{BreakerState, BreakerStatus, CircuitBreaker, RateLimiter};

// Re-export cache types
pub use cache::{CacheKey, CacheStats, ResponseCache};

// Re-export scoring types
pub use scoring::{ConfidenceScorer, RelevanceValidator, ScoreWeights};

// Re-export the static bank and prompt surface
pub use bank::StaticBank;
pub use prompt::Persona;
