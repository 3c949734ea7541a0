use std::sync::Arc;
use std::time::Duration;

use cvault_cache::{CacheStats, OpinionCache};
use cvault_models::{
    AnalystRuntimeConfig, ConsensusResult, ConsensusStatus, ConsensusSummary, CvaultConfig,
    EnvSnapshot, SystemHealthSummary, Vote,
};
use futures::future::BoxFuture;
use futures::stream::{FusedStream, FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::consensus::{calculate, calculate_consensus};
use crate::correlation::new_correlation_id;
use crate::error::AgentError;
use crate::health::HealthTracker;
use crate::invoker::{Invoker, InvokerSettings};
use crate::prompts::build_user_prompt;
use crate::registry::AnalystRegistry;
use crate::transport::AnalystTransport;

/// One event of a streamed round.
#[derive(Debug, Clone)]
pub enum RoundEvent {
    /// An analyst's vote, in completion order.
    Vote(Vote),
    /// Final event: votes in invocation order plus the coarse summary.
    Consensus {
        result: ConsensusResult,
        summary: ConsensusSummary,
    },
}

/// The consensus service. Owns the registry, the invoker (with its rate
/// gate and cache) and the health tracker; everything a round mutates lives
/// here, so separate engines never share state.
pub struct ConsensusEngine {
    registry: Arc<AnalystRegistry>,
    health: Arc<HealthTracker>,
    invoker: Invoker,
}

impl ConsensusEngine {
    pub fn new(
        config: &CvaultConfig,
        env: EnvSnapshot,
        transport: Arc<dyn AnalystTransport>,
    ) -> Self {
        let registry = Arc::new(AnalystRegistry::from_config(config, env));
        let health = Arc::new(HealthTracker::new());
        let mut invoker = Invoker::new(
            transport,
            Arc::clone(&registry),
            Arc::clone(&health),
            InvokerSettings::from(&config.engine),
        );
        if config.cache.enabled {
            invoker = invoker.with_cache(OpinionCache::new(
                config.cache.max_capacity,
                Duration::from_secs(config.cache.ttl_seconds),
            ));
        }

        info!(
            analysts = registry.ids().len(),
            failover = config.engine.failover,
            cache = config.cache.enabled,
            "Consensus engine ready"
        );

        Self {
            registry,
            health,
            invoker,
        }
    }

    pub fn registry(&self) -> &AnalystRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.invoker.cache().map(OpinionCache::stats)
    }

    pub fn health_summary(&self) -> SystemHealthSummary {
        self.health.system_summary(&self.registry)
    }

    pub fn best_available(&self, exclude: &[&str]) -> Option<AnalystRuntimeConfig> {
        self.health.best_available(&self.registry, exclude)
    }

    /// Run one round: resolve the active set, poll every analyst, reduce the
    /// votes. Fails only when no valid active set can be formed.
    pub async fn run_round(
        &self,
        asset: &str,
        context: Option<&str>,
    ) -> Result<ConsensusResult, AgentError> {
        let correlation_id = new_correlation_id();
        let span = info_span!("round", %correlation_id, asset = %asset);

        async {
            let start = Instant::now();
            let analysts = self.prepare(asset)?;
            info!(analysts = analysts.len(), "Starting round");

            let votes = self.invoker.invoke_round(&analysts, asset, context).await;
            let result = calculate(votes);

            log_outcome(&result, start);
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Like [`run_round`](Self::run_round), but yields each vote as it lands
    /// and finishes with a [`RoundEvent::Consensus`]. Cancelling `cancel`
    /// drops the in-flight calls and ends the stream with no consensus event.
    pub fn stream_round<'a>(
        &'a self,
        asset: &'a str,
        context: Option<&'a str>,
        cancel: CancellationToken,
    ) -> Result<impl FusedStream<Item = RoundEvent> + Send + 'a, AgentError> {
        let correlation_id = new_correlation_id();
        let span = info_span!("round", %correlation_id, asset = %asset, streaming = true);
        let analysts = span.in_scope(|| self.prepare(asset))?;

        let prompt: Arc<str> = build_user_prompt(asset, context).into();
        let pending: FuturesUnordered<BoxFuture<'a, (usize, Vote)>> = analysts
            .into_iter()
            .enumerate()
            .map(|(index, analyst)| {
                let prompt = Arc::clone(&prompt);
                async move {
                    let vote = self
                        .invoker
                        .invoke_analyst(&analyst, asset, context, &prompt)
                        .await;
                    (index, vote)
                }
                .instrument(span.clone())
                .boxed()
            })
            .collect();

        let state = StreamState {
            slots: vec![None; pending.len()],
            pending,
            cancel,
            start: Instant::now(),
            span,
            finished: false,
        };

        Ok(futures::stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            if state.pending.is_empty() {
                state.finished = true;
                let votes: Vec<Vote> = state.slots.drain(..).flatten().collect();
                let summary = calculate_consensus(&votes);
                let result = calculate(votes);
                state.span.in_scope(|| log_outcome(&result, state.start));
                return Some((RoundEvent::Consensus { result, summary }, state));
            }

            let cancel = state.cancel.clone();
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = state.pending.next() => next,
            };

            match next {
                Some((index, vote)) => {
                    state.slots[index] = Some(vote.clone());
                    Some((RoundEvent::Vote(vote), state))
                }
                None => {
                    state.span.in_scope(|| {
                        warn!(
                            outstanding = state.pending.len(),
                            "Round cancelled before all analysts answered"
                        )
                    });
                    None
                }
            }
        })
        .fuse())
    }

    fn prepare(&self, asset: &str) -> Result<Vec<AnalystRuntimeConfig>, AgentError> {
        if asset.trim().is_empty() {
            return Err(AgentError::Configuration(
                "asset must not be empty".to_string(),
            ));
        }
        self.registry.resolve_active()
    }
}

struct StreamState<'a> {
    pending: FuturesUnordered<BoxFuture<'a, (usize, Vote)>>,
    slots: Vec<Option<Vote>>,
    cancel: CancellationToken,
    start: Instant,
    span: tracing::Span,
    finished: bool,
}

fn log_outcome(result: &ConsensusResult, start: Instant) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result.status {
        ConsensusStatus::InsufficientResponses => warn!(
            valid = result.vote_counts.total(),
            votes = result.votes.len(),
            elapsed_ms,
            "Round finished without enough valid votes"
        ),
        _ => info!(
            status = ?result.status,
            signal = ?result.signal,
            buy = result.vote_counts.buy,
            sell = result.vote_counts.sell,
            hold = result.vote_counts.hold,
            elapsed_ms,
            "Round complete"
        ),
    }
}
