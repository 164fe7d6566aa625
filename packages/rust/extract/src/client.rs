//! Completion-service HTTP client.
//!
//! One request per article batch: `{model, temperature, prompt}` in,
//! completion text out. The temperature stays low so extraction is
//! near-deterministic for identical input.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lexpipe_shared::{CompletionConfig, LexpipeError, Result};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("lexpipe/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout. In-flight calls always run to completion or failure;
/// there is no mid-call cancellation.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for the external text-completion service.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl CompletionClient {
    /// Build a client from config plus the resolved credential.
    ///
    /// The credential comes from [`lexpipe_shared::resolve_api_key`]; its
    /// absence is a fatal configuration error handled before any work starts.
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LexpipeError::Extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Send one prompt and return the raw completion text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            prompt,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LexpipeError::Extraction(format!("completion request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LexpipeError::Extraction(format!(
                "completion service returned HTTP {status}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LexpipeError::Extraction(format!("completion response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| LexpipeError::Extraction("completion response had no choices".into()))?;

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(endpoint: String) -> CompletionConfig {
        CompletionConfig {
            endpoint,
            api_key_env: "unused".into(),
            model: "test-model".into(),
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn sends_model_temperature_prompt() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/complete"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "model": "test-model",
                "temperature": 0.1,
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"choices": [{"text": "[]"}]}),
            ))
            .mount(&server)
            .await;

        let client = CompletionClient::new(
            &test_config(format!("{}/complete", server.uri())),
            "sk-test".into(),
        )
        .unwrap();

        let text = client.complete("extract obligations").await.unwrap();
        assert_eq!(text, "[]");
    }

    #[tokio::test]
    async fn non_2xx_is_extraction_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = CompletionClient::new(
            &test_config(format!("{}/complete", server.uri())),
            "sk-test".into(),
        )
        .unwrap();

        let err = client.complete("prompt").await.unwrap_err();
        assert!(matches!(err, LexpipeError::Extraction(_)));
        assert!(err.is_retryable());
    }
}
