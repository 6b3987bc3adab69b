//! Error types for mentor core operations.
//!
//! This module provides the error taxonomy used across the crate: admission,
//! validation, file access, template rendering, generation, and routing all
//! surface their failures through [`Error`] using `thiserror`.
//!
//! Every error maps to a stable reason code (see [`Error::reason_code`]) so
//! callers receive machine-readable failure categories that never echo
//! untrusted input.

use thiserror::Error;

/// Result type alias for mentor core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for mentor core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected by the rate limiter.
    #[error("throttled: retry after {retry_after_ms}ms")]
    Throttled {
        /// Milliseconds until a token becomes available.
        retry_after_ms: u64,
    },

    /// Request rejected by the input validator.
    #[error("bad input: {0}")]
    BadInput(#[from] InputError),

    /// Workspace file read denied by the access controller.
    #[error("file access denied: {0}")]
    FileDenied(#[from] AccessError),

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Generative call failed or timed out.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A safety check failed after the main sanitization pass.
    #[error("unsafe content: {kind}")]
    Unsafe {
        /// What category of unsafe content was detected.
        kind: UnsafeKind,
    },

    /// No route could produce a response.
    #[error("unavailable: {reason}")]
    Unavailable {
        /// Why the request could not be served.
        reason: UnavailableReason,
    },

    /// Invariant violation inside the core. Never carries untrusted content.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the invariant that failed.
        message: String,
    },
}

impl Error {
    /// Returns the stable reason code for this error.
    ///
    /// Codes are part of the external contract: they appear verbatim in
    /// error envelopes and metrics labels, and never contain request text.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "throttled",
            Self::BadInput(e) => e.reason_code(),
            Self::FileDenied(e) => e.reason_code(),
            Self::Template(e) => e.kind.reason_code(),
            Self::Generation(e) => e.reason_code(),
            Self::Unsafe { kind } => kind.reason_code(),
            Self::Unavailable { reason } => reason.reason_code(),
            Self::Internal { .. } => "internal",
        }
    }
}

/// Rejection kinds produced by the input validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Query was empty after trimming.
    #[error("query is empty")]
    EmptyQuery,

    /// Query exceeds the maximum length.
    #[error("query length {len} exceeds maximum {max}")]
    QueryTooLong {
        /// Actual query length in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Context exceeds the maximum length.
    #[error("context length {len} exceeds maximum {max}")]
    ContextTooLong {
        /// Actual context length in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Too many workspace file references.
    #[error("workspace file count {count} exceeds maximum {max}")]
    TooManyFiles {
        /// Number of files supplied.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Input contains a null byte.
    #[error("input contains a null byte")]
    NullByte,

    /// Input contains control characters outside tab/newline/CR.
    #[error("input contains disallowed control characters")]
    ControlCharacter,

    /// Input matches a known prompt-injection lead-in.
    #[error("input matches a prompt-injection pattern")]
    InjectionPattern,
}

impl InputError {
    /// Returns the stable reason code for this rejection.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::QueryTooLong { .. } => "query_too_long",
            Self::ContextTooLong { .. } => "context_too_long",
            Self::TooManyFiles { .. } => "too_many_files",
            Self::NullByte => "null_byte",
            Self::ControlCharacter => "control_character",
            Self::InjectionPattern => "injection_pattern",
        }
    }
}

/// Denial reasons produced by the file access controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Canonical path resolves outside the workspace root.
    #[error("path escapes the workspace root: {path}")]
    OutsideRoot {
        /// The offending path as supplied.
        path: String,
    },

    /// Canonical path matches a deny-list pattern.
    #[error("path matches a denied pattern: {path}")]
    DeniedPattern {
        /// The offending path as supplied.
        path: String,
    },

    /// File extension is not in the allow-list.
    #[error("file extension not allowed: {extension}")]
    ExtensionNotAllowed {
        /// The rejected extension.
        extension: String,
    },

    /// File exceeds the size cap.
    #[error("file size {size} exceeds maximum {max}")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// File does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// Path exists but is not a regular file.
    #[error("not a regular file: {path}")]
    NotAFile {
        /// The offending path.
        path: String,
    },

    /// Path uses foreign platform syntax (e.g. a drive prefix on POSIX).
    #[error("foreign path syntax rejected: {path}")]
    ForeignPathSyntax {
        /// The offending path.
        path: String,
    },

    /// File could not be read (permissions, encoding, or I/O failure).
    #[error("file unreadable: {path}: {reason}")]
    Unreadable {
        /// The offending path.
        path: String,
        /// Reason the read failed.
        reason: String,
    },

    /// The read exceeded its wall-clock budget.
    #[error("file read exceeded its time budget: {path}")]
    TimedOut {
        /// The offending path.
        path: String,
    },
}

impl AccessError {
    /// Returns the stable reason code for this denial.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::OutsideRoot { .. } => "file_outside_root",
            Self::DeniedPattern { .. } => "file_denied_pattern",
            Self::ExtensionNotAllowed { .. } => "file_extension",
            Self::TooLarge { .. } => "file_too_large",
            Self::NotFound { .. } => "file_not_found",
            Self::NotAFile { .. } => "file_not_regular",
            Self::ForeignPathSyntax { .. } => "file_foreign_syntax",
            Self::Unreadable { .. } => "file_unreadable",
            Self::TimedOut { .. } => "file_read_timeout",
        }
    }
}

/// Failure kinds for the sandboxed template renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// Template body failed to parse (unbalanced or malformed braces).
    Syntax,
    /// No template with the requested name exists in the catalogue.
    UnknownTemplate,
    /// A placeholder had no matching variable.
    MissingVariable,
    /// A placeholder used attribute or index traversal.
    UnsafeConstruct,
    /// Rendered output exceeded the size bound.
    OutputTooLarge,
}

impl TemplateErrorKind {
    /// Returns the stable reason code for this failure kind.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::Syntax => "template_syntax",
            Self::UnknownTemplate => "template_unknown",
            Self::MissingVariable => "template_missing_variable",
            Self::UnsafeConstruct => "template_unsafe_construct",
            Self::OutputTooLarge => "template_output_too_large",
        }
    }
}

impl std::fmt::Display for TemplateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason_code())
    }
}

/// Template rendering error.
///
/// Carries the template name and failure kind only. Variable values are
/// untrusted and never appear in the message or logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} in template '{template}'")]
pub struct TemplateError {
    /// What went wrong.
    pub kind: TemplateErrorKind,
    /// Name of the template being rendered.
    pub template: String,
}

impl TemplateError {
    /// Creates a template error for the named template.
    #[must_use]
    pub fn new(kind: TemplateErrorKind, template: impl Into<String>) -> Self {
        Self {
            kind,
            template: template.into(),
        }
    }
}

/// Failures from the generative client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The completion did not arrive within the timeout.
    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed wall-clock time in milliseconds.
        elapsed_ms: u64,
    },

    /// The host returned an error.
    #[error("generation host error: {0}")]
    Host(String),

    /// The host returned an empty completion.
    #[error("generation produced an empty completion")]
    EmptyCompletion,
}

impl GenerationError {
    /// Returns the stable reason code for this failure.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "generation_timeout",
            Self::Host(_) => "generation_error",
            Self::EmptyCompletion => "generation_empty",
        }
    }
}

/// Categories of unsafe content detected after sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeKind {
    /// A secret survived scrubbing and was detected at output time.
    SecretLeak,
    /// A template attempted an unsafe construct at render time.
    Template,
}

impl UnsafeKind {
    /// Returns the stable reason code for this category.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::SecretLeak => "unsafe_secret_leak",
            Self::Template => "unsafe_template",
        }
    }
}

impl std::fmt::Display for UnsafeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason_code())
    }
}

/// Why no route could produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The circuit breaker is open and no static fallback exists.
    BreakerOpen,
    /// The response failed the output safety check.
    UnsafeOutput,
    /// Generation failed and no static fallback exists.
    GenerationFailed,
}

impl UnavailableReason {
    /// Returns the stable reason code for this outcome.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::BreakerOpen => "breaker_open",
            Self::UnsafeOutput => "unsafe",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason_code())
    }
}
