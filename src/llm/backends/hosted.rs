//! Hosted inference API backend
//!
//! Speaks the hosted request/response shape: POST
//! `{base_url}/models/{model}` with a bearer token and a body
//! `{"inputs": prompt, "parameters": {...}}`, answered by
//! `[{"generated_text": ...}]`. The returned text echoes the prompt, so the
//! reply is cut out after the final open assistant marker.

use crate::llm::backends::{CompletionChunk, CompletionRequest, CompletionStream, LlmBackend};
use crate::llm::prompt::{assistant_suffix, ROLE_END};
use crate::{ConfabError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Backend for a hosted inference API
pub struct HostedBackend {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HostedBackend {
    /// Create a backend against the default hosted endpoint
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_token)
    }

    /// Create a backend against a specific base URL
    pub fn with_base_url(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }

    /// Cut the reply out of a generated text that echoes the prompt
    fn extract_answer(generated: &str) -> String {
        let suffix = assistant_suffix();
        let after = match generated.rfind(&suffix) {
            Some(pos) => &generated[pos + suffix.len()..],
            None => generated,
        };
        let answer = match after.find(ROLE_END) {
            Some(pos) => &after[..pos],
            None => after,
        };
        answer.to_string()
    }
}

#[async_trait]
impl LlmBackend for HostedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = self.endpoint(&request.model);
        debug!(model = %request.model, url = %url, "Sending hosted inference request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({
                "inputs": request.prompt,
                "parameters": {
                    "max_new_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            // Hosted models cold-start; 503 means "loading", not "broken"
            let body = response.text().await.unwrap_or_default();
            return Err(ConfabError::ModelNotReady(format!(
                "model {} is still loading: {}",
                request.model, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConfabError::TransportError(format!(
                "hosted inference request failed (status {}): {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let results: Vec<GeneratedText> = serde_json::from_str(&body)?;
        let first = results.first().ok_or_else(|| {
            ConfabError::BackendProtocolError("empty result array from hosted API".to_string())
        })?;

        Ok(Self::extract_answer(&first.generated_text))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        // The hosted API is request/response; emulate the stream contract
        // with a single explicitly-done chunk.
        let text = self.complete(request).await?;
        let stream = futures::stream::once(async move {
            Ok(CompletionChunk { text, done: true })
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "hosted"
    }
}
