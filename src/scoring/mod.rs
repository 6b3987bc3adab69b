//! Query scoring.
//!
//! Two judgments drive routing: the confidence scorer estimates how well a
//! canned response could answer the query, and the relevance validator
//! checks that a concrete static candidate actually speaks to the query's
//! critical terms before it is allowed out the door.

pub mod confidence;
pub mod relevance;

pub use confidence::{ConfidenceReport, ConfidenceScorer, PatternCategory, ScoreWeights};
pub use relevance::{RelevanceResult, RelevanceValidator};
