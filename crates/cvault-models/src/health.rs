use serde::{Deserialize, Serialize};

/// Share of active analysts that must be answering for a `healthy` system.
pub const HEALTHY_THRESHOLD_PCT: f64 = 80.0;
/// Below this share the system is `unhealthy`.
pub const DEGRADED_THRESHOLD_PCT: f64 = 20.0;

/// Rolling call statistics for one analyst. Lives for the process lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Running mean over successful calls only.
    pub average_latency_ms: f64,
    /// Consecutive failures, reset by the next success.
    pub failure_streak: u32,
}

impl HealthRecord {
    pub fn record(&mut self, success: bool, latency_ms: u64) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
            let n = self.successful_calls as f64;
            self.average_latency_ms += (latency_ms as f64 - self.average_latency_ms) / n;
            self.failure_streak = 0;
        } else {
            self.failed_calls += 1;
            self.failure_streak += 1;
        }
    }

    /// 0.0 to 1.0; zero before any call.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_percentage(healthy_pct: f64) -> Self {
        if healthy_pct >= HEALTHY_THRESHOLD_PCT {
            HealthStatus::Healthy
        } else if healthy_pct >= DEGRADED_THRESHOLD_PCT {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystHealth {
    pub analyst_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub failure_streak: u32,
    pub total_calls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemHealthSummary {
    pub status: HealthStatus,
    pub healthy_percentage: f64,
    pub analysts: Vec<AnalystHealth>,
}
