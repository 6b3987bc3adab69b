//! Inbound request types.
//!
//! A [`MentorRequest`] is the programmatic form of a `mentor_query` call:
//! the raw query text plus optional context, workspace references, intent,
//! and routing flags. Bounds are enforced by the input validator, not here.

use serde::{Deserialize, Serialize};

/// Coarse category for a query, used in cache and bank lookup keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Weighing architectural alternatives.
    ArchitectureDecision,
    /// Diagnosing a defect or unexpected behavior.
    Debugging,
    /// Reviewing a proposed change.
    CodeReview,
    /// Wiring up a third-party service or SDK.
    Integration,
    /// Latency, throughput, or resource questions.
    Performance,
    /// Authentication, authorization, or data protection questions.
    Security,
    /// Anything else.
    #[default]
    General,
}

impl Intent {
    /// Returns the stable tag used in cache keys and bank lookups.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArchitectureDecision => "architecture_decision",
            Self::Debugging => "debugging",
            Self::CodeReview => "code_review",
            Self::Integration => "integration",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::General => "general",
        }
    }

    /// Parses an intent tag, falling back to [`Intent::General`].
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "architecture_decision" => Self::ArchitectureDecision,
            "debugging" => Self::Debugging,
            "code_review" => Self::CodeReview,
            "integration" => Self::Integration,
            "performance" => Self::Performance,
            "security" => Self::Security,
            _ => Self::General,
        }
    }
}

/// Requested answer quality, trading latency for depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Prefer the fastest acceptable answer.
    Fast,
    /// Balance latency and depth.
    #[default]
    Balanced,
    /// Prefer depth over latency.
    High,
}

/// Routing flags carried by a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Skip static routing entirely. Wins over `prefer_speed`.
    pub force_dynamic: bool,

    /// Accept a hybrid response at lower confidence for latency.
    pub prefer_speed: bool,

    /// Requested answer quality.
    #[serde(default)]
    pub quality: Quality,
}

/// A workspace file reference as supplied by the caller.
///
/// Carries the raw path only; canonicalization and policy checks happen in
/// the file access controller, which produces the resolved form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Path as supplied, relative to the workspace root or absolute.
    pub path: String,
}

impl FileReference {
    /// Creates a file reference from a raw path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl From<&str> for FileReference {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// A single mentor query.
///
/// # Examples
///
/// ```
/// use mentor_rs::core::MentorRequest;
///
/// let request = MentorRequest::new("caller-1", "Should we shard the users table?");
/// assert_eq!(request.caller, "caller-1");
/// assert!(request.workspace.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentorRequest {
    /// Caller identity used for rate limiting.
    pub caller: String,

    /// The engineering question or proposal text.
    pub query: String,

    /// Optional intent tag; inferred as [`Intent::General`] when absent.
    pub intent: Option<Intent>,

    /// Optional free-form context (PR description, issue body, snippet).
    pub context: Option<String>,

    /// Workspace files the caller wants considered, in order.
    pub workspace: Vec<FileReference>,

    /// Opaque session identifier, if the caller tracks one.
    pub session: Option<String>,

    /// Whole-request deadline in milliseconds.
    pub deadline_ms: Option<u64>,

    /// Routing flags.
    pub flags: RequestFlags,
}

impl MentorRequest {
    /// Creates a request with empty optional fields and default flags.
    #[must_use]
    pub fn new(caller: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            query: query.into(),
            intent: None,
            context: None,
            workspace: Vec::new(),
            session: None,
            deadline_ms: None,
            flags: RequestFlags::default(),
        }
    }

    /// Returns the effective intent, defaulting to [`Intent::General`].
    #[must_use]
    pub fn intent_or_default(&self) -> Intent {
        self.intent.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip() {
        for intent in [
            Intent::ArchitectureDecision,
            Intent::Debugging,
            Intent::CodeReview,
            Intent::Integration,
            Intent::Performance,
            Intent::Security,
            Intent::General,
        ] {
            assert_eq!(Intent::parse(intent.as_str()), intent);
        }
    }

    #[test]
    fn test_intent_parse_unknown_falls_back() {
        assert_eq!(Intent::parse("interpretive_dance"), Intent::General);
    }

    #[test]
    fn test_request_new_defaults() {
        let request = MentorRequest::new("c", "q");
        assert_eq!(request.intent_or_default(), Intent::General);
        assert!(!request.flags.force_dynamic);
        assert!(!request.flags.prefer_speed);
        assert_eq!(request.flags.quality, Quality::Balanced);
        assert!(request.deadline_ms.is_none());
    }

    #[test]
    fn test_flags_serde() {
        let flags: RequestFlags =
            serde_json::from_str(r#"{"force_dynamic": true, "prefer_speed": false, "quality": "high"}"#)
                .unwrap();
        assert!(flags.force_dynamic);
        assert_eq!(flags.quality, Quality::High);
    }

    #[test]
    fn test_file_reference_from_str() {
        let file: FileReference = "src/main.rs".into();
        assert_eq!(file.path, "src/main.rs");
    }

    #[test]
    fn test_request_serde_round_trip() {
        let mut request = MentorRequest::new("caller", "query text");
        request.intent = Some(Intent::Debugging);
        request.workspace.push("src/lib.rs".into());

        let json = serde_json::to_string(&request).unwrap();
        let back: MentorRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
