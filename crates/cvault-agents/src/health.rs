use std::cmp::Ordering;

use cvault_models::{
    AnalystHealth, AnalystRuntimeConfig, HealthRecord, HealthStatus, SystemHealthSummary,
};
use dashmap::DashMap;
use tracing::debug;

use crate::registry::AnalystRegistry;

/// Per-analyst call statistics, shared by every round of one engine.
#[derive(Debug, Default)]
pub struct HealthTracker {
    records: DashMap<String, HealthRecord>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, analyst_id: &str, success: bool, latency_ms: u64) {
        let mut record = self.records.entry(analyst_id.to_string()).or_default();
        record.record(success, latency_ms);
        debug!(
            analyst = analyst_id,
            success,
            latency_ms,
            failure_streak = record.failure_streak,
            "Recorded analyst outcome"
        );
    }

    pub fn record(&self, analyst_id: &str) -> Option<HealthRecord> {
        self.records.get(analyst_id).map(|r| r.value().clone())
    }

    /// Preferred enabled analyst with a credential, skipping `exclude`.
    /// Lower priority first, then cheaper cost weight; unknown cost sorts last.
    pub fn best_available(
        &self,
        registry: &AnalystRegistry,
        exclude: &[&str],
    ) -> Option<AnalystRuntimeConfig> {
        registry
            .all()
            .into_iter()
            .filter(|a| a.enabled && !exclude.contains(&a.id()) && registry.has_credential(a))
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| compare_cost(a.cost_weight, b.cost_weight))
            })
    }

    pub fn system_summary(&self, registry: &AnalystRegistry) -> SystemHealthSummary {
        let analysts: Vec<AnalystHealth> = registry
            .all()
            .into_iter()
            .map(|a| {
                let record = self.record(a.id()).unwrap_or_default();
                AnalystHealth {
                    analyst_id: a.id().to_string(),
                    display_name: a.config.display_name.clone(),
                    enabled: a.enabled,
                    success_rate: record.success_rate(),
                    average_latency_ms: record.average_latency_ms,
                    failure_streak: record.failure_streak,
                    total_calls: record.total_calls,
                }
            })
            .collect();

        let observed: Vec<&AnalystHealth> =
            analysts.iter().filter(|a| a.total_calls > 0).collect();
        let healthy_percentage = if observed.is_empty() {
            100.0
        } else {
            let answering = observed.iter().filter(|a| a.success_rate > 0.0).count();
            answering as f64 / observed.len() as f64 * 100.0
        };

        SystemHealthSummary {
            status: HealthStatus::from_percentage(healthy_percentage),
            healthy_percentage,
            analysts,
        }
    }
}

fn compare_cost(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_with_all_keys;
    use cvault_models::{AnalystSpec, CvaultConfig, EnvSnapshot, Priority};

    #[test]
    fn records_are_created_lazily() {
        let tracker = HealthTracker::new();
        assert!(tracker.record("deepseek").is_none());

        tracker.record_outcome("deepseek", true, 120);
        tracker.record_outcome("deepseek", false, 0);

        let record = tracker.record("deepseek").unwrap();
        assert_eq!(record.total_calls, 2);
        assert_eq!(record.failure_streak, 1);
        assert!((record.average_latency_ms - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn best_available_follows_priority() {
        let registry = AnalystRegistry::with_defaults(env_with_all_keys());
        let tracker = HealthTracker::new();

        assert_eq!(tracker.best_available(&registry, &[]).unwrap().id(), "deepseek");
        assert_eq!(
            tracker.best_available(&registry, &["deepseek", "kimi"]).unwrap().id(),
            "minimax"
        );
    }

    #[test]
    fn best_available_skips_disabled_and_keyless() {
        let env = EnvSnapshot::from_pairs([("GLM_API_KEY", "x"), ("GEMINI_API_KEY", "y")]);
        let registry = AnalystRegistry::with_defaults(env);
        registry.set_enabled("glm", false).unwrap();
        let tracker = HealthTracker::new();

        assert_eq!(tracker.best_available(&registry, &[]).unwrap().id(), "gemini");
        assert!(tracker.best_available(&registry, &["gemini"]).is_none());
    }

    #[test]
    fn cost_breaks_priority_ties() {
        let mut config = CvaultConfig::default();
        for (id, cost) in [("deepseek", None), ("kimi", Some(0.5)), ("minimax", Some(0.1))] {
            config.analysts.insert(
                id.to_string(),
                AnalystSpec {
                    priority: Some(Priority(1).into()),
                    cost_weight: cost,
                    ..Default::default()
                },
            );
        }
        let registry = AnalystRegistry::from_config(&config, env_with_all_keys());
        let tracker = HealthTracker::new();

        assert_eq!(tracker.best_available(&registry, &[]).unwrap().id(), "minimax");
        assert_eq!(
            tracker.best_available(&registry, &["minimax"]).unwrap().id(),
            "kimi"
        );
        assert_eq!(
            tracker.best_available(&registry, &["minimax", "kimi"]).unwrap().id(),
            "deepseek"
        );
    }

    #[test]
    fn summary_without_calls_is_healthy() {
        let registry = AnalystRegistry::with_defaults(EnvSnapshot::default());
        let summary = HealthTracker::new().system_summary(&registry);
        assert_eq!(summary.status, HealthStatus::Healthy);
        assert_eq!(summary.analysts.len(), 6);
    }

    #[test]
    fn summary_status_tracks_answering_share() {
        let registry = AnalystRegistry::with_defaults(EnvSnapshot::default());
        let tracker = HealthTracker::new();
        tracker.record_outcome("deepseek", true, 100);
        tracker.record_outcome("kimi", false, 0);
        tracker.record_outcome("minimax", false, 0);

        let summary = tracker.system_summary(&registry);
        assert_eq!(summary.status, HealthStatus::Degraded);
        assert!((summary.healthy_percentage - 100.0 / 3.0).abs() < 1e-9);

        let deepseek = summary
            .analysts
            .iter()
            .find(|a| a.analyst_id == "deepseek")
            .unwrap();
        assert_eq!(deepseek.success_rate, 1.0);

        tracker.record_outcome("glm", false, 0);
        tracker.record_outcome("gemini", false, 0);
        tracker.record_outcome("gpt5", false, 0);
        assert_eq!(tracker.system_summary(&registry).status, HealthStatus::Unhealthy);
    }
}
