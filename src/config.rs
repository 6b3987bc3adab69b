//! Configuration for the mentor core.
//!
//! All tunables live in [`MentorConfig`]: routing thresholds, cache and
//! limiter parameters, breaker policy, generation budget, validation bounds,
//! and workspace access policy. A [`ConfigHandle`] wraps the active config
//! in an atomically swappable snapshot so rare hot reloads never block
//! in-flight requests.
//!
//! Resolution order for overrides: explicit construction, then `MENTOR_*`
//! environment variables, then compiled-in defaults.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::normalized::CriticalTermMode;
use crate::error::{Error, Result};
use crate::sanitize::default_injection_patterns;
use crate::scoring::ScoreWeights;

/// Default minimum confidence to attempt a static route.
pub const DEFAULT_STATIC_THRESHOLD: f64 = 0.7;

/// Default minimum confidence to attempt a hybrid route.
pub const DEFAULT_HYBRID_THRESHOLD: f64 = 0.4;

/// Default response cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Default response cache capacity in entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default per-caller token bucket capacity.
pub const DEFAULT_RATE_CAPACITY: u32 = 10;

/// Default token refill rate per minute.
pub const DEFAULT_RATE_REFILL_PER_MINUTE: f64 = 60.0;

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Default seconds the breaker stays open before probing.
pub const DEFAULT_BREAKER_RECOVERY_SECONDS: u64 = 60;

/// Default successful probes required to close the breaker.
pub const DEFAULT_BREAKER_PROBE_REQUIRED: u32 = 2;

/// Default generation token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default generation wall-clock timeout in seconds.
pub const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 30;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default minimum relevance score for static candidates.
pub const DEFAULT_RELEVANCE_MIN_SCORE: f64 = 0.3;

/// Default minimum matched critical terms for static candidates.
pub const DEFAULT_RELEVANCE_MIN_MATCHES: usize = 2;

/// Default whole-request deadline in milliseconds.
pub const DEFAULT_DEADLINE_MS: u64 = 60_000;

/// Default workspace file size cap (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Default cap on bytes read from a workspace file (64 KiB).
pub const DEFAULT_SNIPPET_BYTES: usize = 64 * 1024;

/// Default wall-clock budget for a single workspace read (2 s).
pub const DEFAULT_READ_BUDGET_MS: u64 = 2000;

fn default_true() -> bool {
    true
}

fn default_rate_max_buckets() -> usize {
    4096
}

fn default_rate_retain_buckets() -> usize {
    3072
}

fn default_breaker_probe_capacity() -> u32 {
    3
}

fn default_max_query_chars() -> usize {
    5000
}

fn default_max_context_chars() -> usize {
    5000
}

fn default_max_workspace_files() -> usize {
    32
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "rb", "c", "h", "cpp", "hpp", "cs",
        "md", "txt", "toml", "yaml", "yml", "json", "sql", "sh", "proto",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_denied_path_patterns() -> Vec<String> {
    [
        r"(^|/)\.git(/|$)",
        r"(^|/)\.hg(/|$)",
        r"(^|/)\.svn(/|$)",
        r"(^|/)\.ssh(/|$)",
        r"(^|/)\.aws(/|$)",
        r"(^|/)\.gnupg(/|$)",
        r"(^|/)\.config(/|$)",
        r"(^|/)secrets?(/|$)",
        r"(^|/)credentials?(/|$)",
        r"(^|/)\.env($|\.)",
        r"^/etc(/|$)",
        r"^/proc(/|$)",
        r"^/sys(/|$)",
        r"^/dev(/|$)",
        r"id_rsa|id_ed25519",
        r"\.pem$",
        r"\.key$",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Workspace file access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory workspace reads must stay within. `None` disables
    /// workspace reads entirely.
    pub root: Option<PathBuf>,

    /// Extensions (without the dot) permitted for workspace reads.
    pub allowed_extensions: Vec<String>,

    /// Regex patterns matched against canonical paths; any match denies.
    pub denied_path_patterns: Vec<String>,

    /// Maximum size of a readable file in bytes.
    pub max_file_bytes: u64,

    /// Maximum bytes returned per snippet; longer files are truncated.
    pub snippet_bytes: usize,

    /// Wall-clock budget for a single read, in milliseconds. A zero
    /// budget times out every read.
    pub read_budget_ms: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            allowed_extensions: default_allowed_extensions(),
            denied_path_patterns: default_denied_path_patterns(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            snippet_bytes: DEFAULT_SNIPPET_BYTES,
            read_budget_ms: DEFAULT_READ_BUDGET_MS,
        }
    }
}

/// Complete configuration for a [`crate::router::MentorCore`] instance.
///
/// Deserializable with per-field defaults so partial configs work:
///
/// ```
/// use mentor_rs::config::MentorConfig;
///
/// let config: MentorConfig = serde_json::from_str(r#"{"static_threshold": 0.9}"#).unwrap();
/// assert!((config.static_threshold - 0.9).abs() < f64::EPSILON);
/// assert_eq!(config.cache_capacity, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentorConfig {
    /// Minimum confidence to attempt a static response.
    pub static_threshold: f64,

    /// Minimum confidence to attempt a hybrid response.
    pub hybrid_threshold: f64,

    /// Response cache TTL in seconds.
    pub cache_ttl_seconds: u64,

    /// Response cache capacity in entries.
    pub cache_capacity: usize,

    /// Per-caller token bucket capacity.
    pub rate_capacity: u32,

    /// Token refill rate per minute.
    pub rate_refill_per_minute: f64,

    /// Live bucket count that triggers limiter trimming.
    #[serde(default = "default_rate_max_buckets")]
    pub rate_max_buckets: usize,

    /// Bucket count retained after limiter trimming.
    #[serde(default = "default_rate_retain_buckets")]
    pub rate_retain_buckets: usize,

    /// Consecutive failures before the breaker opens.
    pub breaker_failure_threshold: u32,

    /// Seconds the breaker stays open before admitting probes.
    pub breaker_recovery_seconds: u64,

    /// Successful probes required to close the breaker.
    pub breaker_probe_required: u32,

    /// Concurrent probe calls admitted while half-open.
    #[serde(default = "default_breaker_probe_capacity")]
    pub breaker_probe_capacity: u32,

    /// Token budget for a single generation.
    pub max_tokens: u32,

    /// Wall-clock timeout for a single generation, in seconds.
    pub generation_timeout_seconds: u64,

    /// Sampling temperature for generation.
    pub temperature: f32,

    /// Minimum `matched/critical` ratio for a static candidate to pass.
    pub relevance_min_score: f64,

    /// Minimum matched critical terms for a static candidate to pass.
    pub relevance_min_matches: usize,

    /// Which term set counts as critical for relevance.
    pub relevance_mode: CriticalTermMode,

    /// Whether the generative path is available at all.
    #[serde(default = "default_true")]
    pub generative_enabled: bool,

    /// Whole-request deadline applied when the request carries none.
    pub default_deadline_ms: u64,

    /// Maximum query length in characters.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Maximum context length in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Maximum number of workspace file references per request.
    #[serde(default = "default_max_workspace_files")]
    pub max_workspace_files: usize,

    /// Prompt-injection lead-ins, matched case-insensitively against the
    /// normalized input. Configurable data, not code.
    pub injection_patterns: Vec<String>,

    /// Workspace file access policy.
    pub workspace: WorkspaceConfig,

    /// Confidence scoring weights and pattern catalogue.
    pub weights: ScoreWeights,

    /// Model identifier sent to the generative host.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the generative host base URL.
    pub api_base: Option<String>,
}

impl Default for MentorConfig {
    fn default() -> Self {
        Self {
            static_threshold: DEFAULT_STATIC_THRESHOLD,
            hybrid_threshold: DEFAULT_HYBRID_THRESHOLD,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            rate_capacity: DEFAULT_RATE_CAPACITY,
            rate_refill_per_minute: DEFAULT_RATE_REFILL_PER_MINUTE,
            rate_max_buckets: default_rate_max_buckets(),
            rate_retain_buckets: default_rate_retain_buckets(),
            breaker_failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_recovery_seconds: DEFAULT_BREAKER_RECOVERY_SECONDS,
            breaker_probe_required: DEFAULT_BREAKER_PROBE_REQUIRED,
            breaker_probe_capacity: default_breaker_probe_capacity(),
            max_tokens: DEFAULT_MAX_TOKENS,
            generation_timeout_seconds: DEFAULT_GENERATION_TIMEOUT_SECONDS,
            temperature: DEFAULT_TEMPERATURE,
            relevance_min_score: DEFAULT_RELEVANCE_MIN_SCORE,
            relevance_min_matches: DEFAULT_RELEVANCE_MIN_MATCHES,
            relevance_mode: CriticalTermMode::default(),
            generative_enabled: true,
            default_deadline_ms: DEFAULT_DEADLINE_MS,
            max_query_chars: default_max_query_chars(),
            max_context_chars: default_max_context_chars(),
            max_workspace_files: default_max_workspace_files(),
            injection_patterns: default_injection_patterns(),
            workspace: WorkspaceConfig::default(),
            weights: ScoreWeights::default(),
            model: default_model(),
            api_base: None,
        }
    }
}

impl MentorConfig {
    /// Builds a config from defaults plus `MENTOR_*` environment overrides.
    ///
    /// Recognized variables:
    /// - `MENTOR_STATIC_THRESHOLD`, `MENTOR_HYBRID_THRESHOLD`
    /// - `MENTOR_STATIC_ONLY` (`1`/`true` forces `static_threshold` to 0)
    /// - `MENTOR_GENERATIVE` (`0`/`false` disables the generative path)
    /// - `MENTOR_GENERATION_TIMEOUT_SECONDS`
    /// - `MENTOR_MODEL`, `MENTOR_API_BASE`
    ///
    /// Malformed numeric values are ignored in favor of the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<f64>("MENTOR_STATIC_THRESHOLD") {
            config.static_threshold = v;
        }
        if let Some(v) = env_parse::<f64>("MENTOR_HYBRID_THRESHOLD") {
            config.hybrid_threshold = v;
        }
        if env_flag("MENTOR_STATIC_ONLY") {
            config.static_threshold = 0.0;
        }
        if let Ok(v) = std::env::var("MENTOR_GENERATIVE") {
            config.generative_enabled = !matches!(v.as_str(), "0" | "false" | "off");
        }
        if let Some(v) = env_parse::<u64>("MENTOR_GENERATION_TIMEOUT_SECONDS") {
            config.generation_timeout_seconds = v;
        }
        if let Ok(v) = std::env::var("MENTOR_MODEL") {
            if !v.is_empty() {
                config.model = v;
            }
        }
        if let Ok(v) = std::env::var("MENTOR_API_BASE") {
            if !v.is_empty() {
                config.api_base = Some(v);
            }
        }

        config
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.static_threshold) {
            return Err(config_error("static_threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.hybrid_threshold) {
            return Err(config_error("hybrid_threshold must be in [0, 1]"));
        }
        if self.hybrid_threshold > self.static_threshold {
            return Err(config_error(
                "hybrid_threshold must not exceed static_threshold",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(config_error("cache_capacity must be > 0"));
        }
        if self.rate_capacity == 0 {
            return Err(config_error("rate_capacity must be > 0"));
        }
        if self.rate_refill_per_minute <= 0.0 {
            return Err(config_error("rate_refill_per_minute must be > 0"));
        }
        if self.rate_retain_buckets > self.rate_max_buckets {
            return Err(config_error(
                "rate_retain_buckets must not exceed rate_max_buckets",
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(config_error("breaker_failure_threshold must be > 0"));
        }
        if self.breaker_probe_required == 0 {
            return Err(config_error("breaker_probe_required must be > 0"));
        }
        if self.breaker_probe_capacity < self.breaker_probe_required {
            return Err(config_error(
                "breaker_probe_capacity must cover breaker_probe_required",
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_min_score) {
            return Err(config_error("relevance_min_score must be in [0, 1]"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> Error {
    Error::Internal {
        message: format!("configuration: {message}"),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "on"))
        .unwrap_or(false)
}

/// Shared handle to the active configuration snapshot.
///
/// Readers take a cheap `Arc` clone; [`ConfigHandle::reload`] swaps the
/// snapshot atomically without disturbing requests already holding one.
#[derive(Debug)]
pub struct ConfigHandle {
    inner: RwLock<Arc<MentorConfig>>,
}

impl ConfigHandle {
    /// Wraps a validated config in a handle.
    #[must_use]
    pub fn new(config: MentorConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Returns the current snapshot.
    ///
    /// Falls back to the default config if the lock was poisoned, which can
    /// only happen if a reload panicked mid-swap.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MentorConfig> {
        self.inner
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Replaces the active config with a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is inconsistent; the active
    /// snapshot is left untouched in that case.
    pub fn reload(&self, config: MentorConfig) -> Result<()> {
        config.validate()?;
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}
