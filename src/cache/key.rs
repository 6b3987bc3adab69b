//! Deterministic cache key derivation.
//!
//! The key is a SHA-256 digest over the canonical request fingerprint:
//! normalized intent, the normalized query prefix, the sorted technology
//! terms, and the sorted pattern tags. Response content never influences
//! the key, and equal normalized requests hash identically in every
//! process.

use sha2::{Digest, Sha256};

use crate::core::normalized::NormalizedQuery;
use crate::core::request::Intent;

/// Number of leading query words included in the fingerprint.
pub const KEY_PREFIX_WORDS: usize = 12;

/// A derived cache key (hex SHA-256 digest of the fingerprint).
///
/// Fingerprint collisions are treated as equivalent requests by design;
/// there is no secondary disambiguation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a normalized request.
    ///
    /// `pattern_tags` are the common-question categories matched by the
    /// confidence scorer; they are sorted here so caller ordering does not
    /// perturb the digest.
    #[must_use]
    pub fn derive(intent: Intent, normalized: &NormalizedQuery, pattern_tags: &[String]) -> Self {
        let prefix: Vec<&str> = normalized
            .text
            .split_whitespace()
            .take(KEY_PREFIX_WORDS)
            .collect();

        let tech: Vec<&str> = normalized.tech_terms.iter().map(String::as_str).collect();

        let mut tags: Vec<&str> = pattern_tags.iter().map(String::as_str).collect();
        tags.sort_unstable();
        tags.dedup();

        let fingerprint = format!(
            "{}\n{}\n{}\n{}",
            intent.as_str(),
            prefix.join(" "),
            tech.join(","),
            tags.join(",")
        );

        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
