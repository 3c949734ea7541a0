use std::time::Duration;

use cvault_agents::{AgentError, ConsensusEngine};
use cvault_models::ConsensusResult;
use tokio_util::sync::CancellationToken;

/// Settings for a periodic watch.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub asset: String,
    pub context: Option<String>,
    pub interval: Duration,
    /// Stop after this many rounds; `None` runs until cancelled.
    pub rounds: Option<u32>,
}

/// Runs consensus rounds for one asset on a fixed interval until cancelled
/// or the round limit is reached.
pub struct Watcher<'a> {
    engine: &'a ConsensusEngine,
    config: WatchConfig,
    cancel: CancellationToken,
}

impl<'a> Watcher<'a> {
    pub fn new(engine: &'a ConsensusEngine, config: WatchConfig) -> Self {
        Self {
            engine,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that stops the watch.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run rounds, handing each result to `on_result`. Returns the number of
    /// completed rounds. A round that cannot resolve its analysts ends the
    /// watch with that error.
    pub async fn run<F>(&self, mut on_result: F) -> Result<u32, AgentError>
    where
        F: FnMut(u32, &ConsensusResult),
    {
        tracing::info!(
            asset = %self.config.asset,
            interval_secs = self.config.interval.as_secs(),
            rounds = ?self.config.rounds,
            "Watch starting"
        );

        let mut completed = 0;
        loop {
            let round = self
                .engine
                .run_round(&self.config.asset, self.config.context.as_deref());
            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(completed, "Watch cancelled mid-round");
                    break;
                }
                result = round => result?,
            };

            completed += 1;
            on_result(completed, &result);

            if self.config.rounds.is_some_and(|limit| completed >= limit) {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(completed, "Watch shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::info!(completed, "Watch stopped");
        Ok(completed)
    }
}
