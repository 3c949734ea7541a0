use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default per-attempt deadline for an analyst call.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Wire format spoken by an analyst endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    OpenAi,
    Anthropic,
    Google,
}

impl ProtocolFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::OpenAi => "openai",
            ProtocolFamily::Anthropic => "anthropic",
            ProtocolFamily::Google => "google",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProtocolFamily::OpenAi),
            "anthropic" => Ok(ProtocolFamily::Anthropic),
            "google" => Ok(ProtocolFamily::Google),
            other => Err(format!(
                "unsupported protocol family '{other}' (expected openai, anthropic or google)"
            )),
        }
    }
}

/// Named priority bands. Ordinals 1..=3 map to one class each, 4 and above
/// are all emergency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Primary,
    Secondary,
    Fallback,
    Emergency,
}

impl PriorityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Primary => "primary",
            PriorityClass::Secondary => "secondary",
            PriorityClass::Fallback => "fallback",
            PriorityClass::Emergency => "emergency",
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            PriorityClass::Primary => 1,
            PriorityClass::Secondary => 2,
            PriorityClass::Fallback => 3,
            PriorityClass::Emergency => 4,
        }
    }
}

impl FromStr for PriorityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(PriorityClass::Primary),
            "secondary" => Ok(PriorityClass::Secondary),
            "fallback" => Ok(PriorityClass::Fallback),
            "emergency" => Ok(PriorityClass::Emergency),
            other => Err(format!("unknown priority class '{other}'")),
        }
    }
}

/// Numeric priority ordinal. Lower is preferred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Priority(pub u32);

impl Priority {
    pub const PRIMARY: Priority = Priority(1);

    pub fn class(&self) -> PriorityClass {
        match self.0 {
            0 | 1 => PriorityClass::Primary,
            2 => PriorityClass::Secondary,
            3 => PriorityClass::Fallback,
            _ => PriorityClass::Emergency,
        }
    }
}

impl From<PriorityClass> for Priority {
    fn from(class: PriorityClass) -> Self {
        Priority(class.ordinal())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw priority as written in configuration: either an ordinal or a class name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PrioritySetting {
    Ordinal(i64),
    Named(String),
}

impl PrioritySetting {
    pub fn resolve(&self) -> Result<Priority, String> {
        match self {
            PrioritySetting::Ordinal(n) if *n >= 1 => u32::try_from(*n)
                .map(Priority)
                .map_err(|_| format!("priority {n} is out of range")),
            PrioritySetting::Ordinal(n) => Err(format!("priority must be at least 1, got {n}")),
            PrioritySetting::Named(name) => match name.trim().parse::<i64>() {
                Ok(n) => PrioritySetting::Ordinal(n).resolve(),
                Err(_) => name
                    .parse::<PriorityClass>()
                    .map(Priority::from)
                    .map_err(|e| {
                        format!("{e} (expected primary, secondary, fallback, emergency or a number)")
                    }),
            },
        }
    }
}

impl From<Priority> for PrioritySetting {
    fn from(priority: Priority) -> Self {
        PrioritySetting::Ordinal(i64::from(priority.0))
    }
}

/// Invocation contract of one analyst. Immutable for the duration of a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub endpoint: String,
    /// Name of the environment slot holding the credential, never the secret.
    pub credential_ref: String,
    pub model_name: String,
    pub protocol: ProtocolFamily,
    pub instructions: String,
    pub timeout_ms: u64,
}

/// An analyst's invocation contract plus its operational metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystRuntimeConfig {
    #[serde(flatten)]
    pub config: AnalystConfig,
    pub enabled: bool,
    pub priority: Priority,
    /// Breaks priority ties, cheaper first.
    pub cost_weight: Option<f64>,
    pub max_context_tokens: Option<u32>,
}

impl AnalystRuntimeConfig {
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// One layer of analyst settings. Built-in defaults, config file entries,
/// environment overrides and runtime mutations are each an `AnalystSpec`;
/// they are merged and then validated into an [`AnalystRuntimeConfig`].
///
/// Values are kept loosely typed so bad input surfaces as a validation
/// error for that analyst instead of a failure to load the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalystSpec {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub endpoint: Option<String>,
    pub credential_ref: Option<String>,
    pub model_name: Option<String>,
    pub protocol: Option<String>,
    pub instructions: Option<String>,
    pub timeout_ms: Option<i64>,
    pub enabled: Option<bool>,
    pub priority: Option<PrioritySetting>,
    pub cost_weight: Option<f64>,
    pub max_context_tokens: Option<i64>,
}

impl AnalystSpec {
    /// Returns `self` with every field set in `upper` replaced by `upper`'s value.
    pub fn overlaid_with(mut self, upper: &AnalystSpec) -> AnalystSpec {
        fn take<T: Clone>(slot: &mut Option<T>, upper: &Option<T>) {
            if let Some(v) = upper {
                *slot = Some(v.clone());
            }
        }
        take(&mut self.display_name, &upper.display_name);
        take(&mut self.role, &upper.role);
        take(&mut self.endpoint, &upper.endpoint);
        take(&mut self.credential_ref, &upper.credential_ref);
        take(&mut self.model_name, &upper.model_name);
        take(&mut self.protocol, &upper.protocol);
        take(&mut self.instructions, &upper.instructions);
        take(&mut self.timeout_ms, &upper.timeout_ms);
        take(&mut self.enabled, &upper.enabled);
        take(&mut self.priority, &upper.priority);
        take(&mut self.cost_weight, &upper.cost_weight);
        take(&mut self.max_context_tokens, &upper.max_context_tokens);
        self
    }
}

/// Outcome of validating one analyst's merged settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Registry-wide counts for operator output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryStatistics {
    pub total: usize,
    pub enabled: usize,
    pub invalid: usize,
    pub by_protocol: BTreeMap<String, usize>,
    pub by_priority_class: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_family_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProtocolFamily>(), Ok(ProtocolFamily::OpenAi));
        assert_eq!(" google ".parse::<ProtocolFamily>(), Ok(ProtocolFamily::Google));
        assert!("cohere".parse::<ProtocolFamily>().is_err());
    }

    #[test]
    fn protocol_family_serializes_lowercase() {
        let json = serde_json::to_string(&ProtocolFamily::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn priority_classes_derive_from_ordinals() {
        assert_eq!(Priority(1).class(), PriorityClass::Primary);
        assert_eq!(Priority(2).class(), PriorityClass::Secondary);
        assert_eq!(Priority(3).class(), PriorityClass::Fallback);
        assert_eq!(Priority(4).class(), PriorityClass::Emergency);
        assert_eq!(Priority(9).class(), PriorityClass::Emergency);
    }

    #[test]
    fn priority_setting_accepts_numbers_and_names() {
        assert_eq!(PrioritySetting::Ordinal(5).resolve(), Ok(Priority(5)));
        assert_eq!(
            PrioritySetting::Named("secondary".into()).resolve(),
            Ok(Priority(2))
        );
        assert_eq!(PrioritySetting::Named("3".into()).resolve(), Ok(Priority(3)));
        assert!(PrioritySetting::Ordinal(0).resolve().is_err());
        assert!(PrioritySetting::Named("urgent".into()).resolve().is_err());
    }

    #[test]
    fn priority_setting_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            a: PrioritySetting,
            b: PrioritySetting,
        }
        let h: Holder = toml::from_str("a = 2\nb = \"fallback\"").unwrap();
        assert_eq!(h.a.resolve(), Ok(Priority(2)));
        assert_eq!(h.b.resolve(), Ok(Priority(3)));
    }

    #[test]
    fn overlay_prefers_upper_values() {
        let base = AnalystSpec {
            model_name: Some("base-model".into()),
            timeout_ms: Some(30_000),
            enabled: Some(true),
            ..Default::default()
        };
        let upper = AnalystSpec {
            model_name: Some("override".into()),
            enabled: Some(false),
            ..Default::default()
        };

        let merged = base.overlaid_with(&upper);
        assert_eq!(merged.model_name.as_deref(), Some("override"));
        assert_eq!(merged.timeout_ms, Some(30_000));
        assert_eq!(merged.enabled, Some(false));
    }

    #[test]
    fn runtime_config_flattens_contract_fields() {
        let analyst = AnalystRuntimeConfig {
            config: AnalystConfig {
                id: "deepseek".into(),
                display_name: "Momentum Hunter".into(),
                role: "Technical".into(),
                endpoint: "https://api.deepseek.com/v1".into(),
                credential_ref: "DEEPSEEK_API_KEY".into(),
                model_name: "deepseek-chat".into(),
                protocol: ProtocolFamily::OpenAi,
                instructions: "Respond in JSON".into(),
                timeout_ms: 30_000,
            },
            enabled: true,
            priority: Priority(1),
            cost_weight: None,
            max_context_tokens: Some(500),
        };

        let value = serde_json::to_value(&analyst).unwrap();
        assert_eq!(value["id"], "deepseek");
        assert_eq!(value["protocol"], "openai");
        assert_eq!(value["priority"], 1);
    }
}
