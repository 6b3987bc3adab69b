//! RPC-style envelope for the `mentor_query` operation.
//!
//! Transport layers deserialize inbound payloads into [`QueryEnvelope`],
//! hand them to the router, and serialize the resulting [`QueryReply`].
//! Error envelopes carry a stable reason code and never echo request text.

use serde::{Deserialize, Serialize};

use crate::core::request::{FileReference, Intent, MentorRequest, Quality, RequestFlags};
use crate::core::response::{MentorResponse, RouteDecision, RouteReason};
use crate::error::Error;

/// Outcome category of a `mentor_query` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// A response was produced.
    Success,
    /// The caller exceeded its rate limit.
    Throttled,
    /// The request failed validation or file access policy.
    BadInput,
    /// No route could produce a response.
    Unavailable,
}

/// Inbound `mentor_query` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryEnvelope {
    /// The engineering question or proposal text.
    pub query: String,

    /// Optional free-form context.
    pub context: Option<String>,

    /// Workspace file paths to consider.
    pub workspace_files: Vec<String>,

    /// Optional intent tag (`architecture_decision`, `debugging`, ...).
    pub intent: Option<String>,

    /// Skip static routing entirely.
    pub force_dynamic: bool,

    /// Accept a hybrid response at lower confidence.
    pub prefer_speed: bool,

    /// Requested answer quality.
    pub quality: Quality,

    /// Whole-request deadline in milliseconds.
    pub deadline_ms: Option<u64>,

    /// Caller identity used for rate limiting.
    pub caller_id: String,
}

impl QueryEnvelope {
    /// Converts the envelope into the internal request form.
    #[must_use]
    pub fn into_request(self) -> MentorRequest {
        MentorRequest {
            caller: self.caller_id,
            query: self.query,
            intent: self.intent.as_deref().map(Intent::parse),
            context: self.context,
            workspace: self
                .workspace_files
                .into_iter()
                .map(FileReference::new)
                .collect(),
            session: None,
            deadline_ms: self.deadline_ms,
            flags: RequestFlags {
                force_dynamic: self.force_dynamic,
                prefer_speed: self.prefer_speed,
                quality: self.quality,
            },
        }
    }
}

/// Outbound `mentor_query` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReply {
    /// Outcome category.
    pub status: QueryStatus,

    /// The advisory text, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,

    /// Route that produced the response, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteDecision>,

    /// Why that route was chosen, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_reason: Option<RouteReason>,

    /// Whether the generative host produced the text.
    pub generated: bool,

    /// Whether the text came from the response cache.
    pub cache_hit: bool,

    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,

    /// Confidence score, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Redactions applied across input and output scrubbing.
    pub redactions: usize,

    /// Stable reason code, present on errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Suggested retry delay in milliseconds, present when throttled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl QueryReply {
    /// Builds a success reply from a completed response.
    #[must_use]
    pub fn success(response: MentorResponse) -> Self {
        Self {
            status: QueryStatus::Success,
            response_text: Some(response.text),
            route: Some(response.route),
            route_reason: Some(response.route_reason),
            generated: response.generated,
            cache_hit: response.cache_hit,
            latency_ms: response.latency_ms,
            confidence: Some(response.confidence),
            redactions: response.redactions,
            reason: None,
            retry_after_ms: None,
        }
    }

    /// Builds an error reply carrying the stable reason code only.
    #[must_use]
    pub fn failure(error: &Error, latency_ms: u64) -> Self {
        let status = match error {
            Error::Throttled { .. } => QueryStatus::Throttled,
            Error::BadInput(_) | Error::FileDenied(_) => QueryStatus::BadInput,
            Error::Template(_)
            | Error::Generation(_)
            | Error::Unsafe { .. }
            | Error::Unavailable { .. }
            | Error::Internal { .. } => QueryStatus::Unavailable,
        };
        let retry_after_ms = match error {
            Error::Throttled { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        };
        Self {
            status,
            response_text: None,
            route: None,
            route_reason: None,
            generated: false,
            cache_hit: false,
            latency_ms,
            confidence: None,
            redactions: 0,
            reason: Some(error.reason_code().to_string()),
            retry_after_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InputError, UnavailableReason};

    #[test]
    fn test_envelope_into_request() {
        let envelope = QueryEnvelope {
            query: "why is the cache slow".to_string(),
            intent: Some("performance".to_string()),
            workspace_files: vec!["src/cache.rs".to_string()],
            force_dynamic: true,
            caller_id: "cli".to_string(),
            ..QueryEnvelope::default()
        };
        let request = envelope.into_request();
        assert_eq!(request.caller, "cli");
        assert_eq!(request.intent, Some(Intent::Performance));
        assert_eq!(request.workspace.len(), 1);
        assert!(request.flags.force_dynamic);
    }

    #[test]
    fn test_failure_reply_throttled() {
        let reply = QueryReply::failure(&Error::Throttled { retry_after_ms: 500 }, 1);
        assert_eq!(reply.status, QueryStatus::Throttled);
        assert_eq!(reply.reason.as_deref(), Some("throttled"));
        assert_eq!(reply.retry_after_ms, Some(500));
        assert!(reply.response_text.is_none());
    }

    #[test]
    fn test_failure_reply_bad_input() {
        let reply = QueryReply::failure(&InputError::EmptyQuery.into(), 0);
        assert_eq!(reply.status, QueryStatus::BadInput);
        assert_eq!(reply.reason.as_deref(), Some("empty_query"));
    }

    #[test]
    fn test_failure_reply_breaker_open() {
        let error = Error::Unavailable {
            reason: UnavailableReason::BreakerOpen,
        };
        let reply = QueryReply::failure(&error, 2);
        assert_eq!(reply.status, QueryStatus::Unavailable);
        assert_eq!(reply.reason.as_deref(), Some("breaker_open"));
    }

    #[test]
    fn test_success_reply_carries_metadata() {
        let response = MentorResponse {
            text: "use the managed queue".to_string(),
            route: RouteDecision::Dynamic,
            route_reason: RouteReason::LowConfidence,
            generated: true,
            cache_hit: false,
            latency_ms: 120,
            confidence: 0.25,
            redactions: 1,
        };
        let reply = QueryReply::success(response);
        assert_eq!(reply.status, QueryStatus::Success);
        assert_eq!(reply.route, Some(RouteDecision::Dynamic));
        assert_eq!(reply.redactions, 1);
        assert!(reply.reason.is_none());
    }

    #[test]
    fn test_reply_serialization_skips_absent_fields() {
        let reply = QueryReply::failure(&InputError::NullByte.into(), 0);
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("response_text"));
        assert!(!json.contains("retry_after_ms"));
        assert!(json.contains(r#""reason":"null_byte""#));
    }
}
