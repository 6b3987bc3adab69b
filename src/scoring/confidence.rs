//! Answerability scoring.
//!
//! Estimates how likely a pre-authored response is to satisfy a query: a
//! bounded sum of positive signals (common-question shapes, short generic
//! queries) and negative signals (workspace files, many technologies, long
//! queries). Weights and the pattern catalogue are data, not code, and can
//! be swapped at runtime without a restart.

use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::normalized::NormalizedQuery;

/// One common-question category: a tag plus the regex that detects it.
///
/// Patterns run over the normalized (lower-cased) query text and must stay
/// free of nested unbounded quantifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCategory {
    /// Stable tag, also used as a cache-key component and bank slot.
    pub tag: String,
    /// Detection regex over normalized text.
    pub pattern: String,
}

impl PatternCategory {
    fn new(tag: &str, pattern: &str) -> Self {
        Self {
            tag: tag.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

fn default_pattern_weight() -> f64 {
    0.4
}

fn default_pattern_cap() -> f64 {
    0.8
}

fn default_short_query_bonus() -> f64 {
    0.1
}

fn default_short_query_words() -> usize {
    12
}

fn default_no_tech_bonus() -> f64 {
    0.1
}

fn default_workspace_penalty() -> f64 {
    0.2
}

fn default_file_reference_penalty() -> f64 {
    0.15
}

fn default_many_tech_penalty() -> f64 {
    0.15
}

fn default_many_tech_threshold() -> usize {
    5
}

fn default_long_query_penalty() -> f64 {
    0.1
}

fn default_long_query_words() -> usize {
    40
}

fn default_patterns() -> Vec<PatternCategory> {
    vec![
        PatternCategory::new("how_to", r"^how (do|can|should|would) (i|we|you)\b|^how to "),
        PatternCategory::new(
            "best_practice",
            r"best (way|practice|practices|approach)|recommended (way|approach|pattern)",
        ),
        PatternCategory::new(
            "build_vs_buy",
            r"(build|roll|write) (our|my|your) own|custom (implementation|client|framework|http client)|in-house",
        ),
        PatternCategory::new(
            "choosing_tech",
            r"which (one|tool|framework|database|library|approach)|should (i|we) (use|pick|choose|adopt)|\b(vs|versus)\b",
        ),
        PatternCategory::new("what_is", r"^what (is|are|does)\b|^what's "),
        PatternCategory::new(
            "sanity_check",
            r"^is (it|this) (ok|okay|fine|safe|reasonable|wise)\b|does (it|this) make sense",
        ),
    ]
}

/// Scoring weights and the common-question pattern catalogue.
///
/// Every field has a serde default so partial weight files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Bonus per matched pattern category.
    pub pattern_weight: f64,
    /// Cap on the total pattern contribution.
    pub pattern_cap: f64,
    /// Bonus for queries at or under `short_query_words`.
    pub short_query_bonus: f64,
    /// Word bound for the short-query bonus.
    pub short_query_words: usize,
    /// Bonus when no technology terms are present.
    pub no_tech_bonus: f64,
    /// Penalty when the request carries workspace files.
    pub workspace_penalty: f64,
    /// Penalty when the query references specific files.
    pub file_reference_penalty: f64,
    /// Penalty when distinct technology terms exceed `many_tech_threshold`.
    pub many_tech_penalty: f64,
    /// Technology-term count above which the penalty applies.
    pub many_tech_threshold: usize,
    /// Penalty for queries over `long_query_words`.
    pub long_query_penalty: f64,
    /// Word bound for the long-query penalty.
    pub long_query_words: usize,
    /// Common-question pattern catalogue.
    pub patterns: Vec<PatternCategory>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pattern_weight: default_pattern_weight(),
            pattern_cap: default_pattern_cap(),
            short_query_bonus: default_short_query_bonus(),
            short_query_words: default_short_query_words(),
            no_tech_bonus: default_no_tech_bonus(),
            workspace_penalty: default_workspace_penalty(),
            file_reference_penalty: default_file_reference_penalty(),
            many_tech_penalty: default_many_tech_penalty(),
            many_tech_threshold: default_many_tech_threshold(),
            long_query_penalty: default_long_query_penalty(),
            long_query_words: default_long_query_words(),
            patterns: default_patterns(),
        }
    }
}

/// A confidence score plus the pattern tags that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceReport {
    /// Clamped score in `[0, 1]`.
    pub score: f64,
    /// Tags of the matched pattern categories, in catalogue order.
    pub matched_patterns: Vec<String>,
}

#[derive(Debug)]
struct Compiled {
    weights: ScoreWeights,
    patterns: Vec<(String, Regex)>,
}

/// Scores queries for answerability by a canned response.
///
/// # Examples
///
/// ```
/// use mentor_rs::core::NormalizedQuery;
/// use mentor_rs::scoring::{ConfidenceScorer, ScoreWeights};
///
/// let scorer = ConfidenceScorer::new(&ScoreWeights::default()).unwrap();
/// let generic = NormalizedQuery::parse("How do we name internal services?", None);
/// let report = scorer.score(&generic, 0);
/// assert!(report.score > 0.4);
/// ```
#[derive(Debug)]
pub struct ConfidenceScorer {
    inner: RwLock<Arc<Compiled>>,
}

impl ConfidenceScorer {
    /// Compiles the pattern catalogue and builds a scorer.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for the first invalid pattern.
    pub fn new(weights: &ScoreWeights) -> std::result::Result<Self, regex::Error> {
        let compiled = compile(weights)?;
        Ok(Self {
            inner: RwLock::new(Arc::new(compiled)),
        })
    }

    /// Swaps in new weights without a restart.
    ///
    /// # Errors
    ///
    /// Returns the compile error and leaves the active weights untouched.
    pub fn reload(&self, weights: &ScoreWeights) -> std::result::Result<(), regex::Error> {
        let compiled = Arc::new(compile(weights)?);
        match self.inner.write() {
            Ok(mut guard) => *guard = compiled,
            Err(poisoned) => *poisoned.into_inner() = compiled,
        }
        Ok(())
    }

    /// Scores a normalized query. `workspace_files` is the count of file
    /// references carried by the request.
    #[must_use]
    pub fn score(&self, normalized: &NormalizedQuery, workspace_files: usize) -> ConfidenceReport {
        let compiled = self.snapshot();
        let w = &compiled.weights;

        let mut matched_patterns = Vec::new();
        for (tag, regex) in &compiled.patterns {
            if regex.is_match(&normalized.text) {
                matched_patterns.push(tag.clone());
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let pattern_score = (matched_patterns.len() as f64 * w.pattern_weight).min(w.pattern_cap);

        let mut score = pattern_score;
        if normalized.word_count <= w.short_query_words {
            score += w.short_query_bonus;
        }
        if normalized.tech_term_count() == 0 {
            score += w.no_tech_bonus;
        }
        if workspace_files > 0 {
            score -= w.workspace_penalty;
        }
        if normalized.has_file_reference() {
            score -= w.file_reference_penalty;
        }
        if normalized.tech_term_count() > w.many_tech_threshold {
            score -= w.many_tech_penalty;
        }
        if normalized.word_count > w.long_query_words {
            score -= w.long_query_penalty;
        }

        ConfidenceReport {
            score: score.clamp(0.0, 1.0),
            matched_patterns,
        }
    }

    fn snapshot(&self) -> Arc<Compiled> {
        self.inner
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }
}

fn compile(weights: &ScoreWeights) -> std::result::Result<Compiled, regex::Error> {
    let mut patterns = Vec::with_capacity(weights.patterns.len());
    for category in &weights.patterns {
        patterns.push((category.tag.clone(), Regex::new(&category.pattern)?));
    }
    Ok(Compiled {
        weights: weights.clone(),
        patterns,
    })
}
