//! Query normalization and term extraction.
//!
//! A [`NormalizedQuery`] is the canonical, lower-cased form of a validated
//! request plus the term sets the scoring stages consume: technology and
//! domain vocabulary, identifier-like tokens, and decision markers. It is
//! created by the input validator and dies with the request.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Maximum number of ordered terms retained per query.
pub const MAX_TERMS: usize = 128;

/// Technology and domain vocabulary recognized as critical terms.
static TECH_VOCAB: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Languages and runtimes
        "rust", "python", "javascript", "typescript", "golang", "java", "ruby", "node", "wasm",
        // Data stores
        "postgres", "postgresql", "mysql", "sqlite", "redis", "memcached", "mongodb", "dynamodb",
        "cassandra", "elasticsearch", "kafka", "rabbitmq", "sqs",
        // Infra
        "kubernetes", "docker", "terraform", "nginx", "lambda", "serverless", "vercel",
        "cloudflare", "aws", "gcp", "azure", "s3",
        // Protocols and patterns
        "http", "grpc", "graphql", "rest", "websocket", "webhook", "oauth", "saml", "jwt", "tls",
        "sso", "auth", "authn", "authz",
        // Architecture vocabulary
        "cache", "caching", "queue", "shard", "sharding", "replica", "replication", "partition",
        "microservice", "microservices", "monolith", "architecture", "database", "schema",
        "migration", "api", "sdk", "cli", "orm", "index", "pipeline", "deployment", "retry",
        "backoff", "idempotency", "latency", "throughput", "observability", "telemetry",
        "failover", "consistency", "transaction", "concurrency",
        // Vendors that come up in build-vs-buy debates
        "stripe", "twilio", "auth0", "okta", "datadog", "sentry", "github", "gitlab",
    ]
    .into_iter()
    .collect()
});

/// Multi-word technology phrases matched against the normalized text.
static TECH_PHRASES: &[&str] = &[
    "edge cache",
    "message queue",
    "load balancer",
    "circuit breaker",
    "rate limit",
    "feature flag",
    "connection pool",
    "event sourcing",
    "blue green",
    "dead letter",
];

/// Markers that signal the query is weighing a decision.
static DECISION_MARKERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "vs", "versus", "whether", "tradeoff", "tradeoffs", "choose", "choosing", "compare",
        "comparison", "decide", "deciding", "debating", "alternative", "alternatives", "migrate",
        "migrating", "adopt", "adopting", "switch", "switching",
    ]
    .into_iter()
    .collect()
});

/// Common words excluded from the widened (all-terms) critical set.
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "if", "then", "else", "we", "our", "us", "is",
        "are", "was", "were", "be", "been", "being", "to", "for", "of", "in", "on", "at", "by",
        "with", "from", "as", "it", "its", "this", "that", "these", "those", "i", "my", "you",
        "your", "how", "what", "why", "when", "where", "which", "who", "can", "could", "should",
        "would", "will", "do", "does", "did", "have", "has", "had", "not", "no", "so", "about",
        "into", "over", "than", "too", "very", "just", "there", "here", "some", "any", "all",
    ]
    .into_iter()
    .collect()
});

/// File extensions that mark a bare token as a file reference.
static PATH_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".js", ".ts", ".tsx", ".jsx", ".go", ".java", ".rb", ".c", ".h", ".cpp",
    ".cs", ".md", ".toml", ".yaml", ".yml", ".json", ".sql", ".sh", ".proto", ".txt",
];

/// Which extracted terms count as critical for relevance checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalTermMode {
    /// Technology vocabulary, identifiers, and decision markers only.
    #[default]
    CriticalOnly,
    /// Every extracted term except stopwords.
    AllTerms,
}

/// The canonical form of a validated query.
///
/// # Examples
///
/// ```
/// use mentor_rs::core::NormalizedQuery;
///
/// let normalized = NormalizedQuery::parse("  Should we use  Redis or Memcached? ", None);
/// assert_eq!(normalized.text, "should we use redis or memcached?");
/// assert!(normalized.tech_terms.contains("redis"));
/// assert!(normalized.tech_terms.contains("memcached"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// NFC-normalized, lower-cased, whitespace-collapsed query text.
    pub text: String,

    /// Ordered terms extracted from query and context, bounded by [`MAX_TERMS`].
    pub terms: Vec<String>,

    /// Technology and domain vocabulary found in the input.
    pub tech_terms: BTreeSet<String>,

    /// Identifier-like tokens (contain digits, underscores, or dashes).
    pub identifiers: BTreeSet<String>,

    /// Decision markers found in the input.
    pub decision_markers: BTreeSet<String>,

    /// Tokens that parse as file paths, diverted for access control.
    pub file_candidates: Vec<String>,

    /// Word count of the normalized query text.
    pub word_count: usize,
}

impl NormalizedQuery {
    /// Normalizes and tokenizes a query plus optional context.
    ///
    /// The normalized `text` covers the query only; term extraction spans
    /// both query and context so relevance sees the full picture.
    #[must_use]
    pub fn parse(query: &str, context: Option<&str>) -> Self {
        let text = normalize_text(query);
        let word_count = text.split_whitespace().count();

        let mut normalized = Self {
            word_count,
            ..Self::default()
        };

        for phrase in TECH_PHRASES {
            if text.contains(phrase) {
                normalized.tech_terms.insert((*phrase).to_string());
            }
        }

        normalized.extract_terms(&text);
        if let Some(context) = context {
            let context_text = normalize_text(context);
            for phrase in TECH_PHRASES {
                if context_text.contains(phrase) {
                    normalized.tech_terms.insert((*phrase).to_string());
                }
            }
            normalized.extract_terms(&context_text);
        }

        normalized.text = text;
        normalized
    }

    /// Returns the critical term set under the given mode.
    #[must_use]
    pub fn critical_terms(&self, mode: CriticalTermMode) -> BTreeSet<String> {
        match mode {
            CriticalTermMode::CriticalOnly => {
                let mut critical = self.tech_terms.clone();
                critical.extend(self.identifiers.iter().cloned());
                critical.extend(self.decision_markers.iter().cloned());
                critical
            }
            CriticalTermMode::AllTerms => self
                .terms
                .iter()
                .filter(|t| !STOPWORDS.contains(t.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Whether the input referenced specific files.
    #[must_use]
    pub fn has_file_reference(&self) -> bool {
        !self.file_candidates.is_empty()
    }

    /// Number of distinct technology terms found.
    #[must_use]
    pub fn tech_term_count(&self) -> usize {
        self.tech_terms.len()
    }

    fn extract_terms(&mut self, text: &str) {
        for raw in text.split_whitespace() {
            let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.');
            if token.is_empty() {
                continue;
            }
            if looks_like_path(token) {
                self.file_candidates.push(token.to_string());
                continue;
            }
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }

            if self.terms.len() < MAX_TERMS {
                self.terms.push(token.to_string());
            }
            if TECH_VOCAB.contains(token) {
                self.tech_terms.insert(token.to_string());
            }
            if DECISION_MARKERS.contains(token) {
                self.decision_markers.insert(token.to_string());
            }
            if is_identifier_like(token) {
                self.identifiers.insert(token.to_string());
            }
        }
    }
}

/// Applies NFC normalization, lower-casing, and whitespace collapse.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    composed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenizes already-normalized text into its word set.
///
/// Uses Unicode word segmentation, which keeps identifier-shaped tokens
/// (`tier1`, `api_key`) intact while shedding punctuation. The relevance
/// validator runs candidate responses through this so responses and
/// queries agree on what counts as a word.
#[must_use]
pub fn tokenize_terms(text: &str) -> HashSet<String> {
    text.unicode_words().map(str::to_string).collect()
}

/// Whether a token should be diverted to file access control.
fn looks_like_path(token: &str) -> bool {
    if token.contains('/') && token.len() > 1 {
        return true;
    }
    PATH_EXTENSIONS.iter().any(|ext| {
        token.len() > ext.len() && token.ends_with(ext)
    })
}

/// Identifier-like: mixes letters with digits, underscores, or dashes.
fn is_identifier_like(token: &str) -> bool {
    let has_alpha = token.chars().any(|c| c.is_alphabetic());
    let has_marker = token.chars().any(|c| c.is_ascii_digit() || c == '_' || c == '-');
    has_alpha && has_marker
}
