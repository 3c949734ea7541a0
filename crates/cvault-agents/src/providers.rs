use cvault_models::{AnalystRuntimeConfig, ProtocolFamily};
use serde_json::{json, Value};

use crate::error::AgentError;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Generation settings shared by every analyst in a round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// A fully built HTTP call to one analyst endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub analyst_id: String,
    pub protocol: ProtocolFamily,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Build the request for `analyst` in its protocol family's shape.
/// Without a credential (proxy mode) no auth header or key is attached.
pub fn build_request(
    analyst: &AnalystRuntimeConfig,
    credential: Option<&str>,
    instructions: &str,
    user_prompt: &str,
    settings: GenerationSettings,
) -> ProviderRequest {
    let config = &analyst.config;
    let endpoint = config.endpoint.trim_end_matches('/');
    let max_tokens = analyst.max_context_tokens.unwrap_or(settings.max_tokens);
    let mut headers = Vec::new();

    let (url, body) = match config.protocol {
        ProtocolFamily::OpenAi => {
            if let Some(key) = credential {
                headers.push(("Authorization".to_string(), format!("Bearer {key}")));
            }
            (
                format!("{endpoint}/chat/completions"),
                json!({
                    "model": config.model_name,
                    "messages": [
                        {"role": "system", "content": instructions},
                        {"role": "user", "content": user_prompt},
                    ],
                    "temperature": settings.temperature,
                    "max_tokens": max_tokens,
                }),
            )
        }
        ProtocolFamily::Anthropic => {
            if let Some(key) = credential {
                headers.push(("x-api-key".to_string(), key.to_string()));
            }
            headers.push(("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()));
            (
                format!("{endpoint}/messages"),
                json!({
                    "model": config.model_name,
                    "max_tokens": max_tokens,
                    "system": instructions,
                    "messages": [{"role": "user", "content": user_prompt}],
                    "temperature": settings.temperature,
                }),
            )
        }
        ProtocolFamily::Google => {
            let mut url = format!("{endpoint}/models/{}:generateContent", config.model_name);
            if let Some(key) = credential {
                url.push_str("?key=");
                url.push_str(key);
            }
            (
                url,
                json!({
                    "contents": [{"parts": [{"text": format!("{instructions}\n\n{user_prompt}")}]}],
                    "generationConfig": {
                        "temperature": settings.temperature,
                        "maxOutputTokens": max_tokens,
                    },
                }),
            )
        }
    };

    headers.push(("Content-Type".to_string(), "application/json".to_string()));

    ProviderRequest {
        analyst_id: config.id.clone(),
        protocol: config.protocol,
        url,
        headers,
        body,
    }
}

/// Pull the model's text out of a successful provider response.
pub fn extract_reply(protocol: ProtocolFamily, body: &Value) -> Result<String, AgentError> {
    let text = match protocol {
        ProtocolFamily::OpenAi => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        // Reasoning models may put thinking blocks ahead of the text block.
        ProtocolFamily::Anthropic => body
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
                    .find_map(|b| b.get("text").and_then(Value::as_str))
            }),
        ProtocolFamily::Google => body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
    };

    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.to_string()),
        Some(_) => Err(AgentError::Parse(format!("{protocol} reply text is empty"))),
        None => Err(AgentError::Parse(format!(
            "{protocol} response has no reply text"
        ))),
    }
}

/// Classify a non-2xx response from its status and error body.
pub fn classify_failure(status: u16, body: &str) -> AgentError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    let error_type = error
        .and_then(|e| e.get("type").and_then(Value::as_str))
        .unwrap_or_default();
    let error_code = error.and_then(|e| e.get("code"));
    let code_is_rate_limit = match error_code {
        Some(Value::Number(n)) => n.as_u64() == Some(429),
        Some(Value::String(s)) => s == "429" || s == "rate_limit_exceeded",
        _ => false,
    };

    if status == 429
        || matches!(error_type, "rate_limit_error" | "rate_limit_exceeded")
        || code_is_rate_limit
    {
        AgentError::RateLimited { status, message }
    } else if status >= 500 {
        AgentError::Gateway { status, message }
    } else {
        AgentError::Api { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::runtime_analyst_with;

    fn settings() -> GenerationSettings {
        GenerationSettings::default()
    }

    #[test]
    fn openai_request_shape() {
        let analyst = runtime_analyst_with("deepseek", ProtocolFamily::OpenAi, "https://api.deepseek.com/v1/");
        let req = build_request(&analyst, Some("sk-1"), "SYS", "USER", settings());

        assert_eq!(req.url, "https://api.deepseek.com/v1/chat/completions");
        assert!(req
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-1".to_string())));
        assert_eq!(req.body["messages"][0]["role"], "system");
        assert_eq!(req.body["messages"][0]["content"], "SYS");
        assert_eq!(req.body["messages"][1]["content"], "USER");
        assert_eq!(req.body["max_tokens"], 500);
        assert_eq!(req.body["temperature"], 0.7);
    }

    #[test]
    fn anthropic_request_shape() {
        let analyst = runtime_analyst_with("kimi", ProtocolFamily::Anthropic, "https://api.kimi.com/coding/v1");
        let req = build_request(&analyst, Some("k-1"), "SYS", "USER", settings());

        assert_eq!(req.url, "https://api.kimi.com/coding/v1/messages");
        assert!(req.headers.contains(&("x-api-key".to_string(), "k-1".to_string())));
        assert!(req
            .headers
            .contains(&("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())));
        assert_eq!(req.body["system"], "SYS");
        assert_eq!(req.body["messages"][0]["role"], "user");
    }

    #[test]
    fn google_request_shape() {
        let analyst = runtime_analyst_with(
            "gemini",
            ProtocolFamily::Google,
            "https://generativelanguage.googleapis.com/v1beta",
        );
        let req = build_request(&analyst, Some("g-1"), "SYS", "USER", settings());

        assert_eq!(
            req.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-model:generateContent?key=g-1"
        );
        assert_eq!(req.body["contents"][0]["parts"][0]["text"], "SYS\n\nUSER");
        assert_eq!(req.body["generationConfig"]["maxOutputTokens"], 500);
    }

    #[test]
    fn proxy_mode_omits_credentials() {
        let openai = runtime_analyst_with("a", ProtocolFamily::OpenAi, "https://x.test/v1");
        let req = build_request(&openai, None, "S", "U", settings());
        assert!(req.headers.iter().all(|(k, _)| k != "Authorization"));

        let google = runtime_analyst_with("g", ProtocolFamily::Google, "https://g.test");
        let req = build_request(&google, None, "S", "U", settings());
        assert!(!req.url.contains("key="));
    }

    #[test]
    fn per_analyst_token_limit_wins() {
        let mut analyst = runtime_analyst_with("a", ProtocolFamily::OpenAi, "https://x.test/v1");
        analyst.max_context_tokens = Some(1200);
        let req = build_request(&analyst, None, "S", "U", settings());
        assert_eq!(req.body["max_tokens"], 1200);
    }

    #[test]
    fn extracts_reply_per_family() {
        let openai = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_reply(ProtocolFamily::OpenAi, &openai).unwrap(), "hi");

        let anthropic = json!({"content": [
            {"type": "thinking", "thinking": "hmm"},
            {"type": "text", "text": "there"}
        ]});
        assert_eq!(extract_reply(ProtocolFamily::Anthropic, &anthropic).unwrap(), "there");

        let google = json!({"candidates": [{"content": {"parts": [{"text": "yo"}]}}]});
        assert_eq!(extract_reply(ProtocolFamily::Google, &google).unwrap(), "yo");
    }

    #[test]
    fn missing_or_blank_reply_is_a_parse_error() {
        let empty = json!({"choices": []});
        assert!(matches!(
            extract_reply(ProtocolFamily::OpenAi, &empty),
            Err(AgentError::Parse(_))
        ));

        let blank = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(matches!(
            extract_reply(ProtocolFamily::OpenAi, &blank),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn classifies_rate_limits() {
        assert!(matches!(
            classify_failure(429, "Too Many Requests"),
            AgentError::RateLimited { status: 429, .. }
        ));
        let anthropic = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow"}}"#;
        assert_eq!(
            classify_failure(400, anthropic),
            AgentError::RateLimited { status: 400, message: "slow".into() }
        );
        let coded = r#"{"error":{"code":429,"message":"quota"}}"#;
        assert!(matches!(classify_failure(403, coded), AgentError::RateLimited { .. }));
    }

    #[test]
    fn classifies_gateway_and_api_errors() {
        assert!(matches!(
            classify_failure(503, "unavailable"),
            AgentError::Gateway { status: 503, .. }
        ));
        let body = r#"{"error":{"message":"invalid model"}}"#;
        assert_eq!(
            classify_failure(404, body),
            AgentError::Api { status: 404, message: "invalid model".into() }
        );
    }
}
