use std::sync::Arc;
use std::time::Duration;

use cvault_cache::OpinionCache;
use cvault_models::{AnalystRuntimeConfig, EngineConfig, ParsedOpinion, Vote};
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::health::HealthTracker;
use crate::parser::parse_opinion;
use crate::prompts::build_user_prompt;
use crate::providers::{build_request, extract_reply, GenerationSettings};
use crate::rate_gate::RateGate;
use crate::registry::AnalystRegistry;
use crate::transport::AnalystTransport;

/// Retry and payload settings for analyst calls.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerSettings {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub min_call_spacing: Duration,
    pub failover: bool,
    pub generation: GenerationSettings,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for InvokerSettings {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            max_retries: engine.max_retries,
            initial_backoff: Duration::from_millis(engine.initial_backoff_ms),
            backoff_multiplier: engine.backoff_multiplier,
            min_call_spacing: Duration::from_millis(engine.min_call_spacing_ms),
            failover: engine.failover,
            generation: GenerationSettings {
                max_tokens: engine.max_output_tokens,
                temperature: engine.temperature,
            },
        }
    }
}

impl InvokerSettings {
    /// Delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(self.backoff_multiplier.saturating_pow(attempt))
    }
}

/// Calls analysts and turns each call sequence into exactly one [`Vote`].
pub struct Invoker {
    transport: Arc<dyn AnalystTransport>,
    registry: Arc<AnalystRegistry>,
    health: Arc<HealthTracker>,
    gate: RateGate,
    cache: Option<OpinionCache>,
    settings: InvokerSettings,
}

impl Invoker {
    pub fn new(
        transport: Arc<dyn AnalystTransport>,
        registry: Arc<AnalystRegistry>,
        health: Arc<HealthTracker>,
        settings: InvokerSettings,
    ) -> Self {
        Self {
            transport,
            registry,
            health,
            gate: RateGate::new(settings.min_call_spacing),
            cache: None,
            settings,
        }
    }

    pub fn with_cache(mut self, cache: OpinionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&OpinionCache> {
        self.cache.as_ref()
    }

    /// Call every analyst concurrently and wait for all of them.
    /// Votes come back in the order of `analysts`.
    pub async fn invoke_round(
        &self,
        analysts: &[AnalystRuntimeConfig],
        asset: &str,
        context: Option<&str>,
    ) -> Vec<Vote> {
        let user_prompt = build_user_prompt(asset, context);
        join_all(
            analysts
                .iter()
                .map(|analyst| self.invoke_analyst(analyst, asset, context, &user_prompt)),
        )
        .await
    }

    /// One analyst's full sequence: cache, rate gate, attempts with retries,
    /// then failover when enabled. Never fails; failures become votes.
    pub async fn invoke_analyst(
        &self,
        analyst: &AnalystRuntimeConfig,
        asset: &str,
        context: Option<&str>,
        user_prompt: &str,
    ) -> Vote {
        let started = Instant::now();
        let id = analyst.id();

        let outcome = match &self.cache {
            Some(cache) => cache
                .get_or_try_insert_with(
                    OpinionCache::key(id, asset, context),
                    self.call_with_retry(analyst, &analyst.config.instructions, user_prompt),
                )
                .await
                .map_err(|e| (*e).clone()),
            None => self
                .call_with_retry(analyst, &analyst.config.instructions, user_prompt)
                .await
                .map(|opinion| (opinion, false)),
        };

        match outcome {
            Ok((opinion, true)) => {
                debug!(analyst = id, "Using cached opinion");
                Vote::success(id, opinion, 0)
            }
            Ok((opinion, false)) => {
                let elapsed_ms = elapsed_ms(started);
                info!(
                    analyst = id,
                    signal = %opinion.signal,
                    confidence = %opinion.confidence,
                    elapsed_ms,
                    "Analyst voted"
                );
                Vote::success(id, opinion, elapsed_ms)
            }
            Err(err) => {
                if self.settings.failover {
                    if let Some(vote) = self.fail_over(analyst, user_prompt, started).await {
                        return vote;
                    }
                }
                let elapsed_ms = elapsed_ms(started);
                warn!(analyst = id, error = %err, elapsed_ms, "Analyst failed");
                let mut vote = Vote::failure(id, err.vote_status(), err.to_string(), elapsed_ms);
                vote.guidance = Some(err.guidance());
                vote
            }
        }
    }

    /// Try the fallback chain with the original analyst's instructions.
    async fn fail_over(
        &self,
        original: &AnalystRuntimeConfig,
        user_prompt: &str,
        started: Instant,
    ) -> Option<Vote> {
        for candidate_id in self.registry.fallback_chain(original.id()) {
            let Some(candidate) = self.registry.get(&candidate_id) else {
                continue;
            };
            if !self.registry.has_credential(&candidate) {
                continue;
            }

            info!(analyst = original.id(), substitute = %candidate_id, "Failing over");
            match self
                .call_with_retry(&candidate, &original.config.instructions, user_prompt)
                .await
            {
                Ok(opinion) => {
                    let mut vote = Vote::success(original.id(), opinion, elapsed_ms(started));
                    vote.served_by = Some(candidate_id);
                    return Some(vote);
                }
                Err(e) => {
                    warn!(analyst = original.id(), substitute = %candidate_id, error = %e, "Substitute failed");
                }
            }
        }
        None
    }

    /// Attempt the call until it succeeds, fails terminally, or retries run
    /// out. Records the terminal outcome against the analyst's health.
    pub async fn call_with_retry(
        &self,
        analyst: &AnalystRuntimeConfig,
        instructions: &str,
        user_prompt: &str,
    ) -> Result<ParsedOpinion, AgentError> {
        let started = Instant::now();
        let result = self.attempts(analyst, instructions, user_prompt).await;
        self.health
            .record_outcome(analyst.id(), result.is_ok(), elapsed_ms(started));
        result
    }

    async fn attempts(
        &self,
        analyst: &AnalystRuntimeConfig,
        instructions: &str,
        user_prompt: &str,
    ) -> Result<ParsedOpinion, AgentError> {
        let id = analyst.id();
        let credential = self.registry.credential(analyst);
        if credential.is_none() && !self.registry.env().proxy_enabled() {
            return Err(AgentError::Configuration(format!(
                "{} is not set",
                analyst.config.credential_ref
            )));
        }

        let request = build_request(
            analyst,
            credential.as_deref(),
            instructions,
            user_prompt,
            self.settings.generation,
        );
        let deadline = Duration::from_millis(analyst.config.timeout_ms);

        let mut attempt = 0;
        loop {
            self.gate.acquire(id).await;
            debug!(analyst = id, attempt = attempt + 1, "Calling analyst");

            let outcome = match tokio::time::timeout(deadline, self.transport.send(&request)).await {
                Ok(Ok(body)) => {
                    extract_reply(analyst.config.protocol, &body).and_then(|text| parse_opinion(&text))
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(AgentError::Timeout(analyst.config.timeout_ms)),
            };

            match outcome {
                Ok(opinion) => return Ok(opinion),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let backoff = self.settings.backoff(attempt);
                    warn!(
                        analyst = id,
                        attempt = attempt + 1,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Analyst call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
