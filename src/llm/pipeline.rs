//! Background chat pipeline
//!
//! Channel-based wrapper around [`ChatEngine`] so the caller's thread is
//! never blocked on inference latency: one worker thread per pipeline owns
//! the session and a tokio runtime, streams tokens out as they arrive, and
//! appends turns in user-then-assistant order. Callers that need concurrent
//! access serialize through the command channel.

use crate::llm::backends::LlmBackend;
use crate::llm::config::GenerationConfig;
use crate::llm::engine::ChatEngine;
use crate::llm::session::Session;
use crate::{ConfabError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Commands accepted by the pipeline
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Generate a reply for the given user message
    Generate {
        /// The user's message
        user_message: String,
        /// Unique request ID for tracking
        request_id: Uuid,
    },

    /// Replace the session with one seeded by this system preamble
    SetSystemPrompt(String),

    /// Reset the session to its initial seeded state
    ResetSession,

    /// Shutdown the pipeline
    Shutdown,
}

/// Events emitted by the pipeline
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A new token was generated
    Token {
        /// The token text
        token: String,
        /// Request ID this token belongs to
        request_id: Uuid,
    },

    /// Generation completed
    Complete {
        /// The full cleaned response text
        full_response: String,
        /// Request ID
        request_id: Uuid,
        /// Time to first token in milliseconds
        first_token_ms: u64,
        /// Total generation time in milliseconds
        total_ms: u64,
    },

    /// An error occurred; the error string was appended as the reply
    Error {
        /// Error message
        error: String,
        /// Request ID if applicable
        request_id: Option<Uuid>,
    },

    /// Pipeline has shut down
    Shutdown,
}

/// Chat pipeline with channel-based communication
pub struct ChatPipeline {
    backend: Arc<dyn LlmBackend>,
    config: GenerationConfig,
    system_prompt: Option<String>,

    command_tx: Sender<ChatCommand>,
    command_rx: Receiver<ChatCommand>,
    event_tx: Sender<ChatEvent>,
    event_rx: Receiver<ChatEvent>,
}

impl ChatPipeline {
    /// Create a new pipeline
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        config: GenerationConfig,
        system_prompt: Option<String>,
    ) -> Self {
        let (command_tx, command_rx) = bounded(100);
        let (event_tx, event_rx) = bounded(100);

        Self {
            backend,
            config,
            system_prompt,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Get a sender for commands
    pub fn command_sender(&self) -> Sender<ChatCommand> {
        self.command_tx.clone()
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<ChatEvent> {
        self.event_rx.clone()
    }

    /// Start the pipeline worker thread
    pub fn start_worker(self) -> Result<()> {
        let backend = self.backend;
        let config = self.config;
        let system_prompt = self.system_prompt;
        let command_rx = self.command_rx;
        let event_tx = self.event_tx;

        std::thread::Builder::new()
            .name("chat-pipeline".to_string())
            .spawn(move || {
                info!("Chat pipeline worker starting");

                let runtime = match Runtime::new() {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime: {}", e);
                        let _ = event_tx.send(ChatEvent::Error {
                            error: format!("Runtime creation failed: {}", e),
                            request_id: None,
                        });
                        let _ = event_tx.send(ChatEvent::Shutdown);
                        return;
                    }
                };

                let engine = ChatEngine::new(backend, config);
                let mut session = match &system_prompt {
                    Some(prompt) => Session::with_system(prompt.clone()),
                    None => Session::empty(),
                };

                info!("Chat pipeline worker ready");

                loop {
                    match command_rx.recv() {
                        Ok(ChatCommand::Generate {
                            user_message,
                            request_id,
                        }) => {
                            debug!("Processing generate request: {}", request_id);

                            session.push_user(&user_message);

                            let start = Instant::now();
                            let token_tx = event_tx.clone();

                            let result = runtime.block_on(async {
                                let mut stream = engine.reply_stream(&session).await?;

                                let mut full = String::new();
                                let mut first_token_ms = None;

                                while let Some(chunk) = stream.next().await {
                                    let chunk = chunk?;

                                    if !chunk.text.is_empty() {
                                        if first_token_ms.is_none() {
                                            first_token_ms =
                                                Some(start.elapsed().as_millis() as u64);
                                        }
                                        full.push_str(&chunk.text);
                                        let _ = token_tx.send(ChatEvent::Token {
                                            token: chunk.text.clone(),
                                            request_id,
                                        });
                                    }

                                    if chunk.done {
                                        break;
                                    }
                                }

                                Ok::<_, ConfabError>((full, first_token_ms))
                            });

                            match result {
                                Ok((full_response, first_token_ms)) => {
                                    session.push_assistant(&full_response);

                                    let total_ms = start.elapsed().as_millis() as u64;
                                    debug!(
                                        "Generation complete: {} chars in {}ms",
                                        full_response.len(),
                                        total_ms
                                    );

                                    let _ = event_tx.send(ChatEvent::Complete {
                                        full_response,
                                        request_id,
                                        first_token_ms: first_token_ms.unwrap_or(total_ms),
                                        total_ms,
                                    });
                                }
                                Err(e) => {
                                    error!("Generation failed: {}", e);
                                    // The erroring turn is still appended so
                                    // the transcript matches what the user saw
                                    session.push_assistant(format!("Error: {}", e));
                                    let _ = event_tx.send(ChatEvent::Error {
                                        error: e.to_string(),
                                        request_id: Some(request_id),
                                    });
                                }
                            }
                        }

                        Ok(ChatCommand::SetSystemPrompt(prompt)) => {
                            info!("Replacing session with new system prompt");
                            session = Session::with_system(prompt);
                        }

                        Ok(ChatCommand::ResetSession) => {
                            info!("Resetting session");
                            session.reset();
                        }

                        Ok(ChatCommand::Shutdown) => {
                            info!("Chat pipeline worker shutting down");
                            let _ = event_tx.send(ChatEvent::Shutdown);
                            break;
                        }

                        Err(e) => {
                            error!("Command channel error: {}", e);
                            break;
                        }
                    }
                }

                info!("Chat pipeline worker stopped");
            })
            .map_err(|e| ConfabError::ChannelError(format!("Failed to spawn worker: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backends::LocalServerBackend;

    fn test_pipeline() -> ChatPipeline {
        ChatPipeline::new(
            Arc::new(LocalServerBackend::new()),
            GenerationConfig::default(),
            Some("Test prompt".to_string()),
        )
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = test_pipeline();

        let _cmd_tx = pipeline.command_sender();
        let _event_rx = pipeline.event_receiver();
    }

    #[test]
    fn test_command_variants() {
        let cmd = ChatCommand::Generate {
            user_message: "Hello".to_string(),
            request_id: Uuid::new_v4(),
        };
        match cmd {
            ChatCommand::Generate { user_message, .. } => assert_eq!(user_message, "Hello"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_shutdown_event_emitted() {
        let pipeline = test_pipeline();
        let cmd_tx = pipeline.command_sender();
        let event_rx = pipeline.event_receiver();

        pipeline.start_worker().unwrap();

        cmd_tx.send(ChatCommand::Shutdown).unwrap();

        let event = event_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(matches!(event, ChatEvent::Shutdown));
    }
}
