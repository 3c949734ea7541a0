use cvault_models::{GuidanceKind, Severity, UserGuidance, VoteStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Analyst timed out after {0}ms")]
    Timeout(u64),

    #[error("Gateway error (HTTP {status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("Rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Analyst response parse error: {0}")]
    Parse(String),

    #[error("Only {active} analysts available, at least {required} required")]
    InsufficientAnalysts { active: usize, required: usize },
}

impl AgentError {
    /// Transport failures are retried; configuration and parse failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Network(_)
                | AgentError::Timeout(_)
                | AgentError::Gateway { .. }
                | AgentError::RateLimited { .. }
                | AgentError::Api { .. }
        )
    }

    pub fn vote_status(&self) -> VoteStatus {
        match self {
            AgentError::Timeout(_) => VoteStatus::Timeout,
            _ => VoteStatus::Error,
        }
    }

    pub fn guidance(&self) -> UserGuidance {
        let warn = |kind, message: &str, recovery: &str, wait: Option<u64>| UserGuidance {
            kind,
            message: message.to_string(),
            severity: Severity::Warning,
            recovery_guidance: recovery.to_string(),
            retryable: true,
            estimated_wait_ms: wait,
        };

        match self {
            AgentError::RateLimited { .. } => warn(
                GuidanceKind::RateLimit,
                "The analyst is receiving too many requests.",
                "Wait about 45 seconds before requesting another analysis.",
                Some(45_000),
            ),
            AgentError::Gateway { status: 503, .. } => warn(
                GuidanceKind::GatewayError,
                "The analyst service is under high load.",
                "Try again in about 5 minutes.",
                Some(300_000),
            ),
            AgentError::Gateway { .. } => warn(
                GuidanceKind::GatewayError,
                "The analyst service is having server issues.",
                "Try again in about 3 minutes.",
                Some(180_000),
            ),
            AgentError::Timeout(_) => warn(
                GuidanceKind::Timeout,
                "The analyst took too long to respond due to high demand.",
                "Try again in about a minute.",
                Some(60_000),
            ),
            AgentError::Network(_) => warn(
                GuidanceKind::Network,
                "The analyst could not be reached.",
                "Check connectivity and try again in 2-3 minutes.",
                Some(120_000),
            ),
            AgentError::Parse(_) => warn(
                GuidanceKind::ParseError,
                "The analyst returned a reply that could not be understood.",
                "Request a new analysis.",
                None,
            ),
            AgentError::Api { .. } => warn(
                GuidanceKind::ApiError,
                "The analyst service rejected the request.",
                "Request a new analysis; contact support if this persists.",
                None,
            ),
            AgentError::Configuration(_) | AgentError::InsufficientAnalysts { .. } => UserGuidance {
                kind: GuidanceKind::Configuration,
                message: "The analyst is not configured correctly.".to_string(),
                severity: Severity::Critical,
                recovery_guidance: "Contact support; the server configuration needs attention."
                    .to_string(),
                retryable: false,
                estimated_wait_ms: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_retry() {
        assert!(AgentError::Network("refused".into()).is_retryable());
        assert!(AgentError::Timeout(30_000).is_retryable());
        assert!(AgentError::RateLimited { status: 429, message: String::new() }.is_retryable());
        assert!(AgentError::Gateway { status: 502, message: String::new() }.is_retryable());
        assert!(AgentError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!AgentError::Parse("bad".into()).is_retryable());
        assert!(!AgentError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn timeout_is_classified_structurally() {
        assert_eq!(AgentError::Timeout(10).vote_status(), VoteStatus::Timeout);
        // Message text mentioning a timeout does not change the class.
        assert_eq!(
            AgentError::Network("operation timeout".into()).vote_status(),
            VoteStatus::Error
        );
    }

    #[test]
    fn rate_limit_guidance() {
        let g = AgentError::RateLimited { status: 429, message: "slow down".into() }.guidance();
        assert_eq!(g.kind, GuidanceKind::RateLimit);
        assert_eq!(g.severity, Severity::Warning);
        assert!(g.retryable);
        assert_eq!(g.estimated_wait_ms, Some(45_000));
        assert!(g.message.contains("too many requests"));
    }

    #[test]
    fn gateway_guidance_depends_on_status() {
        let bad_gateway = AgentError::Gateway { status: 502, message: String::new() }.guidance();
        assert_eq!(bad_gateway.estimated_wait_ms, Some(180_000));
        assert!(bad_gateway.message.contains("server issues"));

        let unavailable = AgentError::Gateway { status: 503, message: String::new() }.guidance();
        assert_eq!(unavailable.estimated_wait_ms, Some(300_000));
        assert!(unavailable.message.contains("high load"));
    }

    #[test]
    fn timeout_and_network_guidance() {
        let timeout = AgentError::Timeout(30_000).guidance();
        assert_eq!(timeout.kind, GuidanceKind::Timeout);
        assert_eq!(timeout.estimated_wait_ms, Some(60_000));
        assert!(timeout.message.contains("high demand"));

        let network = AgentError::Network("dns".into()).guidance();
        assert_eq!(network.estimated_wait_ms, Some(120_000));
        assert!(network.recovery_guidance.contains("2-3 minutes"));
    }

    #[test]
    fn configuration_guidance_is_critical() {
        let g = AgentError::Configuration("DEEPSEEK_API_KEY is not set".into()).guidance();
        assert_eq!(g.kind, GuidanceKind::Configuration);
        assert_eq!(g.severity, Severity::Critical);
        assert!(!g.retryable);
        assert!(g.recovery_guidance.contains("server configuration"));
    }

    #[test]
    fn parse_guidance_is_a_warning() {
        let g = AgentError::Parse("no json".into()).guidance();
        assert_eq!(g.kind, GuidanceKind::ParseError);
        assert_eq!(g.severity, Severity::Warning);
    }
}
