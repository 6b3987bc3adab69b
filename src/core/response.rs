//! Outbound response types.
//!
//! A [`MentorResponse`] records the advisory text together with how it was
//! produced: the route taken, whether generation ran, cache behavior,
//! latency, confidence, and how many redactions sanitization applied.

use serde::{Deserialize, Serialize};

/// Which path produced (or was chosen to produce) a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDecision {
    /// Pre-authored response from the static bank.
    Static,
    /// Generated response reusing a static scaffold for latency.
    Hybrid,
    /// Fully generated response.
    Dynamic,
}

impl RouteDecision {
    /// Returns the stable label for this decision.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Hybrid => "hybrid",
            Self::Dynamic => "dynamic",
        }
    }
}

impl std::fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the router settled on its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Caller set `force_dynamic`.
    Forced,
    /// Confidence cleared the static threshold.
    HighConfidence,
    /// Confidence cleared the hybrid threshold with `prefer_speed` set.
    SpeedPreference,
    /// Confidence fell below both thresholds.
    LowConfidence,
    /// A static candidate existed but failed the relevance gate.
    RelevanceFallthrough,
    /// No static candidate existed for the intent and slot.
    NoCandidate,
    /// Served from the static bank because the breaker was open.
    BreakerFallback,
    /// Served from the static bank after a generation failure.
    GenerationFallback,
}

impl RouteReason {
    /// Returns the stable label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::HighConfidence => "high_confidence",
            Self::SpeedPreference => "speed_preference",
            Self::LowConfidence => "low_confidence",
            Self::RelevanceFallthrough => "relevance_fallthrough",
            Self::NoCandidate => "no_candidate",
            Self::BreakerFallback => "breaker_fallback",
            Self::GenerationFallback => "generation_fallback",
        }
    }
}

/// A completed advisory response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorResponse {
    /// The advisory text, already scrubbed of secrets.
    pub text: String,

    /// Route that produced the response.
    pub route: RouteDecision,

    /// Why that route was chosen.
    pub route_reason: RouteReason,

    /// Whether the generative host produced the text.
    pub generated: bool,

    /// Whether the text came from the response cache.
    pub cache_hit: bool,

    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,

    /// Confidence score computed for the request.
    pub confidence: f64,

    /// Total redactions applied across input and output scrubbing.
    pub redactions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_decision_labels() {
        assert_eq!(RouteDecision::Static.as_str(), "static");
        assert_eq!(RouteDecision::Hybrid.as_str(), "hybrid");
        assert_eq!(RouteDecision::Dynamic.as_str(), "dynamic");
        assert_eq!(RouteDecision::Dynamic.to_string(), "dynamic");
    }

    #[test]
    fn test_route_reason_labels() {
        assert_eq!(RouteReason::Forced.as_str(), "forced");
        assert_eq!(
            RouteReason::RelevanceFallthrough.as_str(),
            "relevance_fallthrough"
        );
        assert_eq!(RouteReason::BreakerFallback.as_str(), "breaker_fallback");
    }

    #[test]
    fn test_response_serde() {
        let response = MentorResponse {
            text: "advice".to_string(),
            route: RouteDecision::Static,
            route_reason: RouteReason::HighConfidence,
            generated: false,
            cache_hit: false,
            latency_ms: 3,
            confidence: 0.8,
            redactions: 0,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""route":"static""#));
        assert!(json.contains(r#""route_reason":"high_confidence""#));
        let back: MentorResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
