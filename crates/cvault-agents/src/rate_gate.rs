use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Enforces a minimum gap between call starts to the same analyst.
///
/// Each analyst has its own slot, so waiting on one never delays another.
/// Callers for the same analyst queue on the slot in arrival order.
#[derive(Debug, Default)]
pub struct RateGate {
    spacing: Duration,
    last_start: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RateGate {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_start: DashMap::new(),
        }
    }

    /// Wait until `analyst_id` may start a call, then claim the slot.
    pub async fn acquire(&self, analyst_id: &str) {
        if self.spacing.is_zero() {
            return;
        }

        let slot = self
            .last_start
            .entry(analyst_id.to_string())
            .or_default()
            .clone();

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.spacing;
            if Instant::now() < ready_at {
                debug!(
                    analyst = analyst_id,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Rate gate delaying call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_not_delayed() {
        let gate = RateGate::new(Duration::from_millis(1_000));
        let start = Instant::now();
        gate.acquire("deepseek").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_calls_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(1_000));
        let start = Instant::now();
        gate.acquire("deepseek").await;
        gate.acquire("deepseek").await;
        gate.acquire("deepseek").await;
        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn analysts_do_not_share_slots() {
        let gate = RateGate::new(Duration::from_millis(1_000));
        let start = Instant::now();
        gate.acquire("deepseek").await;
        gate.acquire("kimi").await;
        gate.acquire("glm").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_spacing_needs_no_wait() {
        let gate = RateGate::new(Duration::from_millis(1_000));
        gate.acquire("deepseek").await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let start = Instant::now();
        gate.acquire("deepseek").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_spacing_disables_the_gate() {
        let gate = RateGate::new(Duration::ZERO);
        gate.acquire("a").await;
        gate.acquire("a").await;
        assert!(gate.last_start.is_empty());
    }
}
