//! Request validation and normalization.
//!
//! The validator is the only door into the pipeline: it bounds every field,
//! rejects hostile byte sequences and prompt-injection lead-ins, and emits
//! the [`NormalizedQuery`] the rest of the pipeline operates on.
//!
//! The injection lead-in list is configuration data, not code; it can be
//! swapped at runtime together with the rest of the config snapshot.

use std::sync::{Arc, RwLock};

use regex::RegexSet;

use crate::core::normalized::NormalizedQuery;
use crate::error::InputError;

/// Built-in prompt-injection lead-ins.
///
/// Matched case-insensitively against the normalized (lower-cased) text, so
/// the patterns themselves are written lower-case. The list is a seed: the
/// active set lives in config and can be extended without a rebuild.
#[must_use]
pub fn default_injection_patterns() -> Vec<String> {
    [
        r"ignore (all |any )?(previous|prior|above|earlier) (instructions|prompts|messages)",
        r"disregard (all |any )?(previous|prior|above) (instructions|prompts)",
        r"forget (all |your |the )?(previous|prior|system) (instructions|prompts)",
        r"you are now (a|an|the|in) ",
        r"pretend (you are|to be|you're)",
        r"act as (the |a |an )?(system|administrator|root|developer)",
        r"(reveal|print|show|output|repeat) (your|the) (system|hidden|initial) prompt",
        r"new instructions:",
        r"\[system\]",
        r"<\|im_start\|>",
        r"developer mode",
        r"jailbreak",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Bounds applied during validation, taken from the config snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ValidationBounds {
    /// Maximum query length in characters.
    pub max_query_chars: usize,
    /// Maximum context length in characters.
    pub max_context_chars: usize,
    /// Maximum workspace file references.
    pub max_workspace_files: usize,
}

impl Default for ValidationBounds {
    fn default() -> Self {
        Self {
            max_query_chars: 5000,
            max_context_chars: 5000,
            max_workspace_files: 32,
        }
    }
}

/// Validates and normalizes inbound requests.
///
/// # Examples
///
/// ```
/// use mentor_rs::sanitize::InputValidator;
///
/// let validator = InputValidator::with_defaults();
/// let normalized = validator
///     .validate("Should we use SQS or roll our own queue?", None, 0)
///     .unwrap();
/// assert!(normalized.tech_terms.contains("sqs"));
/// ```
#[derive(Debug)]
pub struct InputValidator {
    bounds: ValidationBounds,
    injection: RwLock<Arc<RegexSet>>,
}

impl InputValidator {
    /// Creates a validator with the given bounds and injection lead-ins.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InjectionPattern`]'s sibling failure — an
    /// invalid pattern — as a plain `regex::Error` for the caller to treat
    /// as a configuration problem.
    pub fn new(
        bounds: ValidationBounds,
        injection_patterns: &[String],
    ) -> std::result::Result<Self, regex::Error> {
        let set = compile_injection_set(injection_patterns)?;
        Ok(Self {
            bounds,
            injection: RwLock::new(Arc::new(set)),
        })
    }

    /// Creates a validator with default bounds and the built-in lead-ins.
    #[must_use]
    pub fn with_defaults() -> Self {
        // The built-in list is covered by tests; compilation cannot fail.
        Self::new(ValidationBounds::default(), &default_injection_patterns())
            .unwrap_or_else(|_| Self {
                bounds: ValidationBounds::default(),
                injection: RwLock::new(Arc::new(RegexSet::empty())),
            })
    }

    /// Swaps the active injection lead-in set.
    ///
    /// # Errors
    ///
    /// Returns the compile error and leaves the current set active.
    pub fn reload_injection_patterns(
        &self,
        patterns: &[String],
    ) -> std::result::Result<(), regex::Error> {
        let set = Arc::new(compile_injection_set(patterns)?);
        match self.injection.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
        Ok(())
    }

    /// Validates a query plus optional context and workspace file count.
    ///
    /// Runs the checks in severity order: bounds, hostile bytes, then
    /// injection lead-ins over the normalized text of query and context.
    ///
    /// # Errors
    ///
    /// Returns the first [`InputError`] encountered.
    pub fn validate(
        &self,
        query: &str,
        context: Option<&str>,
        workspace_files: usize,
    ) -> std::result::Result<NormalizedQuery, InputError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyQuery);
        }

        let query_len = query.chars().count();
        if query_len > self.bounds.max_query_chars {
            return Err(InputError::QueryTooLong {
                len: query_len,
                max: self.bounds.max_query_chars,
            });
        }
        if let Some(context) = context {
            let context_len = context.chars().count();
            if context_len > self.bounds.max_context_chars {
                return Err(InputError::ContextTooLong {
                    len: context_len,
                    max: self.bounds.max_context_chars,
                });
            }
        }
        if workspace_files > self.bounds.max_workspace_files {
            return Err(InputError::TooManyFiles {
                count: workspace_files,
                max: self.bounds.max_workspace_files,
            });
        }

        check_bytes(query)?;
        if let Some(context) = context {
            check_bytes(context)?;
        }

        let normalized = NormalizedQuery::parse(query, context);

        let injection = self.injection_set();
        if injection.is_match(&normalized.text) {
            return Err(InputError::InjectionPattern);
        }
        if let Some(context) = context {
            let context_text = crate::core::normalized::normalize_text(context);
            if injection.is_match(&context_text) {
                return Err(InputError::InjectionPattern);
            }
        }

        Ok(normalized)
    }

    fn injection_set(&self) -> Arc<RegexSet> {
        self.injection
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }
}

fn compile_injection_set(patterns: &[String]) -> std::result::Result<RegexSet, regex::Error> {
    RegexSet::new(patterns)
}

/// Rejects null bytes and control characters outside tab/newline/CR.
fn check_bytes(text: &str) -> std::result::Result<(), InputError> {
    for c in text.chars() {
        if c == '\0' {
            return Err(InputError::NullByte);
        }
        if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
            return Err(InputError::ControlCharacter);
        }
    }
    Ok(())
}
