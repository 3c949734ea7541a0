use std::collections::{BTreeMap, HashMap};

use cvault_models::analyst::{DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};
use cvault_models::config::{ENV_SELECTION, ENV_SINGLE_ANALYST};
use cvault_models::{
    AnalystConfig, AnalystRuntimeConfig, AnalystSpec, CvaultConfig, EnvSnapshot, Priority,
    PrioritySetting, ProtocolFamily, RegistryStatistics, ValidationReport,
};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::prompts::default_analysts;
use crate::selection::{by_priority, Selection};

/// Holds every known analyst and resolves the active set for a round.
///
/// Settings are layered: built-in defaults, then config file entries, then
/// `MODEL_<ID>_<FIELD>` environment overrides, then runtime mutations made
/// through [`AnalystRegistry::set_enabled`] and friends. Which analysts run
/// is decided separately by the single-analyst override, the selection
/// expression, or the default list, in that order.
pub struct AnalystRegistry {
    /// Registry order: built-ins first, then config file additions.
    order: Vec<String>,
    base: HashMap<String, AnalystSpec>,
    runtime: DashMap<String, AnalystSpec>,
    fallback_chains: BTreeMap<String, Vec<String>>,
    default_selection: Vec<String>,
    min_analysts: usize,
    env: EnvSnapshot,
}

impl AnalystRegistry {
    pub fn from_config(config: &CvaultConfig, env: EnvSnapshot) -> Self {
        let mut order = Vec::new();
        let mut base = HashMap::new();

        for (id, spec) in default_analysts() {
            order.push(id.clone());
            base.insert(id, spec);
        }

        for (id, spec) in &config.analysts {
            let id = id.trim().to_lowercase();
            match base.remove(&id) {
                Some(existing) => {
                    base.insert(id, existing.overlaid_with(spec));
                }
                None => {
                    debug!(analyst = %id, "Adding analyst from configuration file");
                    order.push(id.clone());
                    base.insert(id, spec.clone());
                }
            }
        }

        apply_env_overrides(&order, &mut base, &env);

        let fallback_chains = config
            .fallback_chains
            .iter()
            .map(|(id, chain)| {
                (
                    id.trim().to_lowercase(),
                    chain.iter().map(|c| c.trim().to_lowercase()).collect(),
                )
            })
            .collect();

        Self {
            order,
            base,
            runtime: DashMap::new(),
            fallback_chains,
            default_selection: config
                .engine
                .default_analysts
                .iter()
                .map(|id| id.trim().to_lowercase())
                .collect(),
            min_analysts: config.engine.min_analysts,
            env,
        }
    }

    /// Registry with built-in analysts and default engine settings.
    pub fn with_defaults(env: EnvSnapshot) -> Self {
        Self::from_config(&CvaultConfig::default(), env)
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn contains(&self, id: &str) -> bool {
        self.base.contains_key(id)
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    fn merged_spec(&self, id: &str) -> Option<AnalystSpec> {
        let base = self.base.get(id)?.clone();
        Some(match self.runtime.get(id) {
            Some(runtime) => base.overlaid_with(runtime.value()),
            None => base,
        })
    }

    /// Merged and validated settings for one analyst.
    pub fn get(&self, id: &str) -> Option<AnalystRuntimeConfig> {
        let spec = self.merged_spec(id)?;
        build_analyst(id, &spec).ok()
    }

    /// Every valid analyst, in registry order.
    fn valid_analysts(&self) -> Vec<AnalystRuntimeConfig> {
        self.order
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Every valid analyst, enabled or not, sorted by priority.
    pub fn all(&self) -> Vec<AnalystRuntimeConfig> {
        by_priority(self.valid_analysts().iter())
    }

    pub fn validate(&self, id: &str) -> ValidationReport {
        match self.merged_spec(id) {
            Some(spec) => validate_spec(id, &spec),
            None => ValidationReport::from_errors(vec![format!("Unknown analyst: {id}")]),
        }
    }

    /// Validation errors per analyst, failing analysts only.
    pub fn validate_all(&self) -> BTreeMap<String, Vec<String>> {
        self.order
            .iter()
            .filter_map(|id| {
                let report = self.validate(id);
                (!report.valid).then(|| (id.clone(), report.errors))
            })
            .collect()
    }

    pub fn has_credential(&self, analyst: &AnalystRuntimeConfig) -> bool {
        self.env.proxy_enabled() || self.env.get(&analyst.config.credential_ref).is_some()
    }

    pub fn credential(&self, analyst: &AnalystRuntimeConfig) -> Option<String> {
        self.env.get(&analyst.config.credential_ref).map(str::to_string)
    }

    /// Resolve the ordered active set for the next round.
    pub fn resolve_active(&self) -> Result<Vec<AnalystRuntimeConfig>, AgentError> {
        for (id, errors) in self.validate_all() {
            error!(analyst = %id, errors = ?errors, "Excluding invalid analyst");
        }

        let valid = self.valid_analysts();
        let (selected, required) = self.select(&valid);

        let active: Vec<AnalystRuntimeConfig> = selected
            .into_iter()
            .filter(|analyst| {
                if self.has_credential(analyst) {
                    true
                } else {
                    error!(
                        analyst = %analyst.id(),
                        credential = %analyst.config.credential_ref,
                        "Excluding analyst: credential not set"
                    );
                    false
                }
            })
            .collect();

        if active.len() < required {
            return Err(AgentError::InsufficientAnalysts {
                active: active.len(),
                required,
            });
        }

        info!(
            analysts = ?active.iter().map(|a| a.id()).collect::<Vec<_>>(),
            "Resolved active analysts"
        );
        Ok(active)
    }

    /// Returns the selected analysts and the minimum count the round needs.
    fn select(&self, valid: &[AnalystRuntimeConfig]) -> (Vec<AnalystRuntimeConfig>, usize) {
        if let Some(raw) = self.env.get(ENV_SINGLE_ANALYST) {
            let id = raw.to_lowercase();
            match valid.iter().find(|a| a.id() == id) {
                Some(analyst) => {
                    if !analyst.enabled {
                        warn!(analyst = %id, "Single-analyst override names a disabled analyst; using it anyway");
                    }
                    info!(analyst = %id, "Using single analyst override");
                    return (vec![analyst.clone()], 1);
                }
                None => warn!(analyst = %id, "Single-analyst override names an unknown analyst"),
            }
        }

        if let Some(expr) = self.env.get(ENV_SELECTION) {
            let selected = Selection::parse(expr).apply(valid);
            if selected.is_empty() {
                warn!(expression = %expr, "Selection matched no analysts; using all enabled analysts");
                return (Selection::All.apply(valid), self.min_analysts);
            }
            return (selected, self.min_analysts);
        }

        let defaults = Selection::List(self.default_selection.clone()).apply(valid);
        (defaults, self.min_analysts)
    }

    /// Substitutes for `id` in the order they should be tried.
    pub fn fallback_chain(&self, id: &str) -> Vec<String> {
        let Some(source) = self.get(id) else {
            return Vec::new();
        };

        let usable = |candidate: &str| {
            candidate != id && self.get(candidate).map(|a| a.enabled).unwrap_or(false)
        };

        if let Some(chain) = self.fallback_chains.get(id) {
            return chain.iter().filter(|c| usable(c.as_str())).cloned().collect();
        }

        let valid = self.valid_analysts();
        let same_family = valid
            .iter()
            .filter(|a| a.config.protocol == source.config.protocol);
        let other_family = valid
            .iter()
            .filter(|a| a.config.protocol != source.config.protocol);

        same_family
            .chain(other_family)
            .filter(|a| a.enabled && a.id() != id)
            .map(|a| a.id().to_string())
            .collect()
    }

    /// Enable or disable an analyst from the next round on.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), AgentError> {
        self.mutate(id, |spec| spec.enabled = Some(enabled))?;
        info!(analyst = %id, enabled, "Analyst enabled flag changed");
        Ok(())
    }

    /// Change an analyst's priority from the next round on.
    pub fn set_priority(&self, id: &str, priority: Priority) -> Result<(), AgentError> {
        if priority.0 == 0 {
            return Err(AgentError::Configuration(
                "priority must be at least 1".to_string(),
            ));
        }
        self.mutate(id, |spec| spec.priority = Some(PrioritySetting::from(priority)))?;
        info!(analyst = %id, priority = priority.0, "Analyst priority changed");
        Ok(())
    }

    fn mutate(&self, id: &str, change: impl FnOnce(&mut AnalystSpec)) -> Result<(), AgentError> {
        if !self.contains(id) {
            return Err(AgentError::Configuration(format!("Unknown analyst: {id}")));
        }
        change(self.runtime.entry(id.to_string()).or_default().value_mut());
        Ok(())
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let valid = self.valid_analysts();
        let mut stats = RegistryStatistics {
            total: self.order.len(),
            enabled: valid.iter().filter(|a| a.enabled).count(),
            invalid: self.order.len() - valid.len(),
            ..Default::default()
        };
        for analyst in &valid {
            *stats
                .by_protocol
                .entry(analyst.config.protocol.to_string())
                .or_default() += 1;
            *stats
                .by_priority_class
                .entry(analyst.priority.class().as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

/// Check one analyst's merged settings.
pub fn validate_spec(id: &str, spec: &AnalystSpec) -> ValidationReport {
    match build_analyst(id, spec) {
        Ok(_) => ValidationReport::from_errors(Vec::new()),
        Err(errors) => ValidationReport::from_errors(errors),
    }
}

/// Apply defaults and validate, producing the immutable per-round config.
pub fn build_analyst(id: &str, spec: &AnalystSpec) -> Result<AnalystRuntimeConfig, Vec<String>> {
    let mut errors = Vec::new();

    let mut required = |field: &str, value: &Option<String>| -> String {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => {
                errors.push(format!("Missing required field: {field}"));
                String::new()
            }
        }
    };

    let display_name = required("display_name", &spec.display_name);
    let endpoint = required("endpoint", &spec.endpoint);
    let credential_ref = required("credential_ref", &spec.credential_ref);
    let model_name = required("model_name", &spec.model_name);
    let protocol_raw = required("protocol", &spec.protocol);
    let instructions = required("instructions", &spec.instructions);

    if id.trim().is_empty() {
        errors.push("Missing required field: id".to_string());
    }

    let protocol = if protocol_raw.is_empty() {
        None
    } else {
        match protocol_raw.parse::<ProtocolFamily>() {
            Ok(p) => Some(p),
            Err(e) => {
                errors.push(e);
                None
            }
        }
    };

    let timeout_ms = spec.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS as i64);
    if timeout_ms < MIN_TIMEOUT_MS as i64 || timeout_ms > MAX_TIMEOUT_MS as i64 {
        errors.push(format!(
            "Timeout must be between {MIN_TIMEOUT_MS}ms and {MAX_TIMEOUT_MS}ms, got {timeout_ms}ms"
        ));
    }

    if !endpoint.is_empty() {
        if let Err(e) = reqwest::Url::parse(&endpoint) {
            errors.push(format!("Invalid endpoint URL '{endpoint}': {e}"));
        }
    }

    let priority = match &spec.priority {
        Some(setting) => setting.resolve().unwrap_or_else(|e| {
            errors.push(e);
            Priority::PRIMARY
        }),
        None => Priority::PRIMARY,
    };

    if let Some(cost) = spec.cost_weight {
        if !cost.is_finite() || cost < 0.0 {
            errors.push(format!("Cost weight must be non-negative, got {cost}"));
        }
    }

    let max_context_tokens = match spec.max_context_tokens {
        Some(n) => match u32::try_from(n) {
            Ok(n) if n >= 1 => Some(n),
            _ => {
                errors.push(format!("Max tokens must be at least 1, got {n}"));
                None
            }
        },
        None => None,
    };

    match protocol {
        Some(protocol) if errors.is_empty() => Ok(AnalystRuntimeConfig {
            config: AnalystConfig {
                id: id.to_string(),
                display_name,
                role: spec.role.clone().unwrap_or_default(),
                endpoint,
                credential_ref,
                model_name,
                protocol,
                instructions,
                timeout_ms: timeout_ms as u64,
            },
            enabled: spec.enabled.unwrap_or(true),
            priority,
            cost_weight: spec.cost_weight,
            max_context_tokens,
        }),
        _ => Err(errors),
    }
}

/// Layer `MODEL_<ID>_<FIELD>` variables onto the matching analysts.
fn apply_env_overrides(order: &[String], base: &mut HashMap<String, AnalystSpec>, env: &EnvSnapshot) {
    for (key, value) in env.analyst_overrides() {
        // ASCII-only folding keeps byte offsets aligned with `key`.
        let lowered = key.to_ascii_lowercase();
        // Longest id wins so `gpt5_mini` is not mistaken for `gpt5`.
        let matched = order
            .iter()
            .filter(|id| {
                lowered
                    .strip_prefix(id.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
            })
            .max_by_key(|id| id.len());

        let Some(id) = matched else {
            warn!(variable = %format!("MODEL_{key}"), "Override for unknown analyst ignored");
            continue;
        };

        let field = lowered[id.len() + 1..].to_ascii_uppercase();
        let Some(spec) = base.get_mut(id) else {
            continue;
        };

        if let Err(reason) = apply_env_field(spec, &field, value) {
            warn!(analyst = %id, field = %field, value = %value, reason = %reason, "Override ignored");
        }
    }
}

fn apply_env_field(spec: &mut AnalystSpec, field: &str, value: &str) -> Result<(), String> {
    match field {
        "ENABLED" => {
            spec.enabled = Some(match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err("expected a boolean".to_string()),
            })
        }
        "PRIORITY" => {
            let setting = PrioritySetting::Named(value.to_string());
            setting.resolve()?;
            spec.priority = Some(setting);
        }
        "BASE_URL" | "BASEURL" => spec.endpoint = Some(value.to_string()),
        "MODEL" => spec.model_name = Some(value.to_string()),
        "TIMEOUT" => {
            spec.timeout_ms = Some(value.parse().map_err(|_| "expected milliseconds".to_string())?)
        }
        "PROVIDER" => {
            let protocol: ProtocolFamily = value.parse()?;
            spec.protocol = Some(protocol.as_str().to_string());
        }
        "MAX_TOKENS" | "MAXTOKENS" => {
            spec.max_context_tokens =
                Some(value.parse().map_err(|_| "expected an integer".to_string())?)
        }
        "COST_PER_TOKEN" | "COSTPERTOKEN" => {
            spec.cost_weight = Some(value.parse().map_err(|_| "expected a number".to_string())?)
        }
        "API_KEY" | "APIKEY" => {
            debug!("Credentials come from the analyst's credential slot; API_KEY override ignored");
        }
        _ => return Err("unknown field".to_string()),
    }
    Ok(())
}
