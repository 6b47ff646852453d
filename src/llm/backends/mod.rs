//! Pluggable inference backends
//!
//! The session manager is backend-agnostic: anything that can turn a prompt
//! string into a completion (whole or chunked) implements [`LlmBackend`].
//! Two concrete transports are provided, matching the two server shapes in
//! the wild: a local model server speaking newline-delimited JSON
//! ([`LocalServerBackend`]) and a hosted inference API
//! ([`HostedBackend`]).

pub mod hosted;
pub mod local;

use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use hosted::HostedBackend;
pub use local::LocalServerBackend;

/// One completion request
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Model identifier, as the backend knows it
    pub model: String,

    /// Fully rendered prompt string
    pub prompt: String,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Top-p sampling
    pub top_p: f32,
}

impl CompletionRequest {
    /// Build a request from a prompt and the session's generation config
    pub fn new(prompt: impl Into<String>, config: &crate::llm::config::GenerationConfig) -> Self {
        Self {
            model: config.model_id.clone(),
            prompt: prompt.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// One streamed fragment of a completion
///
/// `done` is the backend's explicit completion signal. A stream that ends
/// without a `done` chunk was dropped, not finished, and surfaces an error.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionChunk {
    /// Partial text (may be empty on the final chunk)
    pub text: String,

    /// Backend-signaled end of generation
    pub done: bool,
}

/// A finite, non-restartable sequence of completion chunks
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// A chat-completion transport
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Request a complete response
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Request a streamed response
    ///
    /// Backends without incremental delivery return a single-chunk stream.
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
