//! Consensus Vault: multi-analyst trading signal consensus.
//!
//! Polls several independent LLM analysts about one asset, collects their
//! buy/sell/hold votes and reduces them to a single decision that is only
//! issued when at least four analysts agree.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use cvault::models::{CvaultConfig, EnvSnapshot};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = cvault::load_config("config/cvault.toml")?;
//! let engine = cvault::build_engine(&config, EnvSnapshot::from_process())?;
//! let result = engine.run_round("BTC", Some("ETF inflows this week")).await?;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub use cvault_agents as agents;
pub use cvault_cache as cache;
pub use cvault_models as models;

pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cvault_agents::{ConsensusEngine, HttpTransport};
use cvault_models::{CvaultConfig, EnvSnapshot};
use serde_json::{json, Value};

/// Load configuration from `path`. A missing file means built-in defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<CvaultConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(CvaultConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Build an engine that talks to the real analyst endpoints.
pub fn build_engine(config: &CvaultConfig, env: EnvSnapshot) -> Result<ConsensusEngine> {
    let transport = HttpTransport::new().context("Failed to build HTTP transport")?;
    Ok(ConsensusEngine::new(config, env, Arc::new(transport)))
}

/// Registry report: the resolved active set (or why it cannot be formed),
/// per-analyst validation errors and roster statistics.
pub fn analyst_report(engine: &ConsensusEngine) -> Value {
    let registry = engine.registry();
    let resolution = match registry.resolve_active() {
        Ok(active) => json!({
            "active": active.iter().map(|a| a.id()).collect::<Vec<_>>(),
        }),
        Err(e) => json!({
            "error": e.to_string(),
            "guidance": e.guidance(),
        }),
    };

    json!({
        "resolution": resolution,
        "invalid": registry.validate_all(),
        "statistics": registry.statistics(),
        "analysts": registry
            .all()
            .iter()
            .map(|a| json!({
                "id": a.id(),
                "display_name": a.config.display_name,
                "role": a.config.role,
                "protocol": a.config.protocol,
                "model_name": a.config.model_name,
                "priority": a.priority,
                "priority_class": a.priority.class().as_str(),
                "enabled": a.enabled,
                "has_credential": registry.has_credential(a),
            }))
            .collect::<Vec<_>>(),
    })
}
