//! Test support: scripted transports and analyst fixtures.
//!
//! `ScriptedTransport` replays a queue of replies per analyst and records
//! every request it receives together with the (tokio) time it arrived, so
//! tests running on a paused clock can assert on retry and spacing timing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cvault_models::{
    AnalystConfig, AnalystRuntimeConfig, AnalystSpec, EnvSnapshot, Priority, ProtocolFamily,
};
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::AgentError;
use crate::prompts::DEFAULT_ANALYST_IDS;
use crate::providers::{classify_failure, ProviderRequest};
use crate::transport::AnalystTransport;

/// One scripted outcome for a single call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Reply text, wrapped in the caller's protocol envelope.
    Text(String),
    /// Reply text delivered after a delay.
    Delayed(Duration, String),
    /// A raw response body, returned as-is.
    Body(Value),
    Fail(AgentError),
    /// Never completes; the caller's deadline has to fire.
    Hang,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn delayed(ms: u64, text: impl Into<String>) -> Self {
        Reply::Delayed(Duration::from_millis(ms), text.into())
    }

    /// A non-2xx response with a provider-style error body.
    pub fn status(status: u16) -> Self {
        let body = json!({"error": {"message": format!("HTTP {status}")}}).to_string();
        Reply::Fail(classify_failure(status, &body))
    }
}

/// A request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: ProviderRequest,
    pub at: Instant,
}

/// Transport that answers from per-analyst reply queues.
/// An analyst with nothing left in its queue gets a network error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `replies` for `analyst_id`, after anything already queued.
    pub fn script(&self, analyst_id: &str, replies: Vec<Reply>) {
        self.replies
            .lock()
            .unwrap()
            .entry(analyst_id.to_string())
            .or_default()
            .extend(replies);
    }

    /// Script every default analyst with the same reply.
    pub fn script_all(&self, reply: Reply) {
        for id in DEFAULT_ANALYST_IDS {
            self.script(id, vec![reply.clone()]);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, analyst_id: &str) -> usize {
        self.calls_at(analyst_id).len()
    }

    /// Arrival times of every call made to `analyst_id`.
    pub fn calls_at(&self, analyst_id: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.request.analyst_id == analyst_id)
            .map(|c| c.at)
            .collect()
    }

    pub fn last_request_to(&self, analyst_id: &str) -> Option<ProviderRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.request.analyst_id == analyst_id)
            .map(|c| c.request.clone())
    }
}

#[async_trait]
impl AnalystTransport for ScriptedTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<Value, AgentError> {
        self.calls.lock().unwrap().push(RecordedCall {
            request: request.clone(),
            at: Instant::now(),
        });

        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.analyst_id)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Reply::Text(text)) => Ok(reply_body(request.protocol, &text)),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(reply_body(request.protocol, &text))
            }
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(AgentError::Network(format!(
                "no scripted reply for {}",
                request.analyst_id
            ))),
        }
    }
}

/// Wrap reply text the way `protocol`'s API returns it.
pub fn reply_body(protocol: ProtocolFamily, text: &str) -> Value {
    match protocol {
        ProtocolFamily::OpenAi => json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }),
        ProtocolFamily::Anthropic => json!({
            "content": [{"type": "text", "text": text}]
        }),
        ProtocolFamily::Google => json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        }),
    }
}

/// A well-formed analyst reply.
pub fn opinion_text(signal: &str, confidence: u32) -> String {
    json!({
        "signal": signal,
        "confidence": confidence,
        "reasoning": format!("{signal} at {confidence}"),
    })
    .to_string()
}

/// Environment with a credential for every default analyst.
pub fn env_with_all_keys() -> EnvSnapshot {
    EnvSnapshot::from_pairs([
        ("DEEPSEEK_API_KEY", "test-deepseek"),
        ("KIMI_API_KEY", "test-kimi"),
        ("MINIMAX_API_KEY", "test-minimax"),
        ("GLM_API_KEY", "test-glm"),
        ("GEMINI_API_KEY", "test-gemini"),
        ("OPENAI_API_KEY", "test-openai"),
    ])
}

/// A complete, valid spec for an extra analyst.
pub fn spec_for(id: &str, protocol: &str, priority: i64) -> AnalystSpec {
    AnalystSpec {
        display_name: Some(format!("{id} analyst")),
        role: Some("Testing".to_string()),
        endpoint: Some(format!("https://{id}.test/v1")),
        credential_ref: Some(format!("{}_API_KEY", id.to_uppercase())),
        model_name: Some(format!("{id}-model")),
        protocol: Some(protocol.to_string()),
        instructions: Some(format!("You are {id}.")),
        timeout_ms: Some(30_000),
        enabled: Some(true),
        priority: Some(cvault_models::PrioritySetting::Ordinal(priority)),
        cost_weight: None,
        max_context_tokens: None,
    }
}

pub fn runtime_analyst(id: &str, priority: u32, enabled: bool) -> AnalystRuntimeConfig {
    AnalystRuntimeConfig {
        enabled,
        priority: Priority(priority),
        ..runtime_analyst_with(id, ProtocolFamily::OpenAi, &format!("https://{id}.test/v1"))
    }
}

pub fn runtime_analyst_with(
    id: &str,
    protocol: ProtocolFamily,
    endpoint: &str,
) -> AnalystRuntimeConfig {
    AnalystRuntimeConfig {
        config: AnalystConfig {
            id: id.to_string(),
            display_name: format!("{id} analyst"),
            role: "Testing".to_string(),
            endpoint: endpoint.to_string(),
            credential_ref: format!("{}_API_KEY", id.to_uppercase()),
            model_name: format!("{id}-model"),
            protocol,
            instructions: format!("You are {id}."),
            timeout_ms: 30_000,
        },
        enabled: true,
        priority: Priority::PRIMARY,
        cost_weight: None,
        max_context_tokens: None,
    }
}
