use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;

use serde::{Deserialize, Serialize};

use crate::analyst::AnalystSpec;

/// Single-analyst override: when set to a known id, only that analyst runs.
pub const ENV_SINGLE_ANALYST: &str = "ORCHESTRATOR_MODEL";
/// Selection expression (`all`, `a,b,c`, `1-3`, `all,-x`).
pub const ENV_SELECTION: &str = "CONSENSUS_AI_MODELS";
/// When true, credentials are injected downstream and never checked here.
pub const ENV_PROXY_ENABLED: &str = "PROXY_ENABLED";
/// Prefix of per-analyst overrides, `MODEL_<ID>_<FIELD>`.
pub const ENV_OVERRIDE_PREFIX: &str = "MODEL_";

/// Top-level configuration for Consensus Vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CvaultConfig {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    /// Per-analyst settings layered over the built-in defaults. Ids not in
    /// the defaults add new analysts.
    pub analysts: BTreeMap<String, AnalystSpec>,
    /// Explicit substitute order per analyst id.
    pub fallback_chains: BTreeMap<String, Vec<String>>,
}

/// Configuration for the invocation and consensus layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest active set a round may run with.
    pub min_analysts: usize,
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
    /// Minimum gap between call starts to the same analyst.
    pub min_call_spacing_ms: u64,
    /// Walk the fallback chain when an analyst fails terminally.
    pub failover: bool,
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Analysts used when no selection is configured in the environment.
    pub default_analysts: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_analysts: 3,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2,
            min_call_spacing_ms: 1_000,
            failover: false,
            max_output_tokens: 500,
            temperature: 0.7,
            default_analysts: ["deepseek", "kimi", "minimax", "glm", "gemini", "gpt5"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Configuration for the in-memory reply cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// How long a successful reply is reused.
    pub ttl_seconds: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: 45,
            max_capacity: 1_000,
        }
    }
}

/// Environment variables captured once when the engine is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    /// Pairs whose name or value is not valid UTF-8 are skipped.
    pub fn from_os_pairs(pairs: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Trimmed value, `None` when unset or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn proxy_enabled(&self) -> bool {
        self.flag(ENV_PROXY_ENABLED)
    }

    /// Every `MODEL_*` variable with the prefix stripped, in sorted order.
    pub fn analyst_overrides(&self) -> Vec<(&str, &str)> {
        let mut overrides: Vec<(&str, &str)> = self
            .vars
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(ENV_OVERRIDE_PREFIX).map(|rest| (rest, v.as_str())))
            .collect();
        overrides.sort();
        overrides
    }
}
