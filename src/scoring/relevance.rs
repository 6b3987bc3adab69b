//! Static-candidate relevance gating.
//!
//! A canned response may only be returned when it actually references the
//! query's critical terms. The validator extracts those terms from the
//! normalized query, tokenizes the candidate the same way queries are
//! tokenized, and passes the candidate only when both the match ratio and
//! the absolute match count clear their thresholds.

use std::collections::BTreeSet;

use crate::core::normalized::{CriticalTermMode, NormalizedQuery, normalize_text, tokenize_terms};

/// Outcome of gating one candidate response.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceResult {
    /// `matched / required`, or 1.0 when nothing was required.
    pub score: f64,

    /// Critical terms the candidate actually references.
    pub matched_terms: BTreeSet<String>,

    /// Critical terms extracted from the query.
    pub required_terms: BTreeSet<String>,

    /// Whether the candidate may be returned.
    pub passed: bool,
}

/// Gates static candidates against query-critical terms.
///
/// # Examples
///
/// ```
/// use mentor_rs::core::NormalizedQuery;
/// use mentor_rs::core::normalized::CriticalTermMode;
/// use mentor_rs::scoring::RelevanceValidator;
///
/// let validator = RelevanceValidator::new(0.3, 2, CriticalTermMode::CriticalOnly);
/// let query = NormalizedQuery::parse("Should we shard postgres or move to dynamodb?", None);
///
/// let on_topic = validator.validate(&query, "Shard postgres only after exhausting read replicas; dynamodb changes your query model.");
/// assert!(on_topic.passed);
///
/// let off_topic = validator.validate(&query, "Consider using Stripe for billing integrations.");
/// assert!(!off_topic.passed);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RelevanceValidator {
    min_score: f64,
    min_matches: usize,
    mode: CriticalTermMode,
}

impl RelevanceValidator {
    /// Creates a validator with the given thresholds and term mode.
    #[must_use]
    pub const fn new(min_score: f64, min_matches: usize, mode: CriticalTermMode) -> Self {
        Self {
            min_score,
            min_matches,
            mode,
        }
    }

    /// Checks a candidate response against the query's critical terms.
    ///
    /// A query with no critical terms cannot be contradicted by a canned
    /// response, so an empty required set passes vacuously.
    #[must_use]
    pub fn validate(&self, query: &NormalizedQuery, candidate: &str) -> RelevanceResult {
        let required = query.critical_terms(self.mode);
        if required.is_empty() {
            return RelevanceResult {
                score: 1.0,
                matched_terms: BTreeSet::new(),
                required_terms: required,
                passed: true,
            };
        }

        let candidate_text = normalize_text(candidate);
        let candidate_tokens = tokenize_terms(&candidate_text);

        let matched: BTreeSet<String> = required
            .iter()
            .filter(|term| {
                if term.contains(' ') {
                    candidate_text.contains(term.as_str())
                } else {
                    candidate_tokens.contains(term.as_str())
                }
            })
            .cloned()
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let score = matched.len() as f64 / required.len() as f64;
        let passed = score >= self.min_score && matched.len() >= self.min_matches;

        RelevanceResult {
            score,
            matched_terms: matched,
            required_terms: required,
            passed,
        }
    }
}
