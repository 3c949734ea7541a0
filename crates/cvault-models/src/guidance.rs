use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceKind {
    RateLimit,
    GatewayError,
    Timeout,
    Network,
    Configuration,
    ParseError,
    ApiError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Operator-facing explanation of a failed analyst call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserGuidance {
    #[serde(rename = "type")]
    pub kind: GuidanceKind,
    pub message: String,
    pub severity: Severity,
    pub recovery_guidance: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_as_type() {
        let guidance = UserGuidance {
            kind: GuidanceKind::RateLimit,
            message: "too many requests".into(),
            severity: Severity::Warning,
            recovery_guidance: "wait".into(),
            retryable: true,
            estimated_wait_ms: Some(45_000),
        };
        let value = serde_json::to_value(&guidance).unwrap();
        assert_eq!(value["type"], "rate_limit");
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["estimated_wait_ms"], 45_000);
    }

    #[test]
    fn omits_missing_wait() {
        let guidance = UserGuidance {
            kind: GuidanceKind::Configuration,
            message: "missing credential".into(),
            severity: Severity::Critical,
            recovery_guidance: "contact support".into(),
            retryable: false,
            estimated_wait_ms: None,
        };
        let value = serde_json::to_value(&guidance).unwrap();
        assert!(value.get("estimated_wait_ms").is_none());
    }
}
