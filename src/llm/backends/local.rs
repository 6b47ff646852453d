//! Local model server backend
//!
//! Speaks the `/api/generate` protocol of local inference servers: a JSON
//! request `{"model", "prompt", "stream", "options"}` answered either by a
//! single `{"response", "done"}` object or, when streaming, by one such
//! object per line of newline-delimited JSON.

use crate::llm::backends::{CompletionChunk, CompletionRequest, CompletionStream, LlmBackend};
use crate::{ConfabError, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Backend for a local model server
pub struct LocalServerBackend {
    base_url: String,
    client: reqwest::Client,
}

/// One line of the generate protocol
#[derive(Debug, Deserialize)]
struct GenerateLine {
    response: String,
    #[serde(default)]
    done: bool,
}

impl LocalServerBackend {
    /// Create a backend against the default local endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a backend against a specific base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": stream,
            "options": {
                "num_predict": request.max_tokens,
                "temperature": request.temperature,
                "top_p": request.top_p,
            }
        })
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let url = self.endpoint();
        debug!(model = %request.model, url = %url, stream, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&self.build_body(request, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConfabError::TransportError(format!(
                "generate request failed (status {}): {}",
                status, body
            )));
        }

        Ok(response)
    }
}

impl Default for LocalServerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for LocalServerBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self.send(request, false).await?;

        let body = response.text().await?;
        let line: GenerateLine = serde_json::from_str(&body)?;

        debug!(chars = line.response.len(), "Generate request complete");
        Ok(line.response)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let response = self.send(request, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut saw_done = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| ConfabError::TransportError(e.to_string()))?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    if line.trim().is_empty() {
                        continue;
                    }

                    let parsed: GenerateLine = serde_json::from_str(&line)?;
                    let done = parsed.done;
                    yield CompletionChunk { text: parsed.response, done };

                    if done {
                        saw_done = true;
                        break;
                    }
                }

                if saw_done {
                    break;
                }
            }

            // A trailing line without a newline still counts
            if !saw_done && !buffer.is_empty() {
                let line = String::from_utf8_lossy(&buffer).into_owned();
                if !line.trim().is_empty() {
                    let parsed: GenerateLine = serde_json::from_str(&line)?;
                    let done = parsed.done;
                    yield CompletionChunk { text: parsed.response, done };
                    saw_done = done;
                }
            }

            if !saw_done {
                Err(ConfabError::TransportError(
                    "stream closed before the backend signaled completion".to_string(),
                ))?;
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "local-server"
    }
}
