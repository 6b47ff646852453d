//! Conversation session management
//!
//! Owns the conversation transcript, renders it into the prompt format
//! chat-tuned models expect, runs completions against a pluggable backend,
//! and parses the model's raw output back into clean text.
//!
//! # Architecture
//!
//! - **session**: the `Turn`/`Session` transcript types
//! - **prompt**: ChatML rendering and parsing (the model protocol contract)
//! - **config**: generation parameters
//! - **backends**: pluggable HTTP transports (local server, hosted API)
//! - **engine**: reply generation, the two-stage thinking protocol, and
//!   boundary error handling
//! - **thinking**: inline `<think>` block cleaning, whole and streaming
//! - **prompts**: the system instruction texts
//! - **pipeline**: channel-based background worker per session
//!
//! # Usage
//!
//! ```rust,no_run
//! use confab::llm::{ChatEngine, GenerationConfig, LocalServerBackend, Session};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let backend = Arc::new(LocalServerBackend::new());
//! let engine = ChatEngine::new(backend, GenerationConfig::new("llama3.1:8b"));
//!
//! let mut session = Session::with_system("You are a helpful assistant.");
//! session.push_user("What's the capital of France?");
//!
//! let reply = engine.generate_reply(&mut session).await;
//! println!("{}", reply);
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod prompt;
pub mod prompts;
pub mod session;
pub mod thinking;

// Re-export commonly used types
pub use backends::{
    CompletionChunk, CompletionRequest, CompletionStream, HostedBackend, LlmBackend,
    LocalServerBackend,
};
pub use config::GenerationConfig;
pub use engine::ChatEngine;
pub use pipeline::{ChatCommand, ChatEvent, ChatPipeline};
pub use prompt::{parse_prompt, render_prompt};
pub use prompts::SYSTEM_PROMPT;
pub use session::{Role, Session, Turn};
pub use thinking::{clean_response, ThinkingFilter};
