use async_trait::async_trait;
use tracing::debug;

use crate::error::AgentError;
use crate::providers::{classify_failure, ProviderRequest};

/// Sends provider requests. Mockable for testing.
///
/// Implementations return the decoded JSON body of a 2xx response and map
/// every other outcome onto [`AgentError`]. Deadlines are enforced by the
/// caller.
#[async_trait]
pub trait AnalystTransport: Send + Sync {
    async fn send(&self, request: &ProviderRequest) -> Result<serde_json::Value, AgentError>;
}

/// Transport over HTTPS using reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AnalystTransport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<serde_json::Value, AgentError> {
        debug!(analyst = %request.analyst_id, protocol = %request.protocol, "Sending analyst request");

        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Network(e.without_url().to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AgentError::Parse(format!("Response body is not JSON: {e}")))
    }
}
