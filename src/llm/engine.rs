//! Reply generation against a pluggable backend
//!
//! `ChatEngine` turns a session into a prompt, runs it through the backend,
//! cleans the output, and keeps the transcript consistent with what the
//! caller saw. Transport and protocol failures are converted at this boundary
//! into a displayable `"Error: …"` string that is appended like any reply;
//! callers always get a string back and the session never loses a turn.

use crate::llm::backends::{CompletionChunk, CompletionRequest, CompletionStream, LlmBackend};
use crate::llm::config::GenerationConfig;
use crate::llm::prompt::{assistant_suffix, render_history, render_prompt, render_turn};
use crate::llm::prompts::{answer_instruction, THINKING_INSTRUCTION};
use crate::llm::session::{Role, Session};
use crate::llm::thinking::{clean_response, ThinkingFilter};
use crate::{ConfabError, Result};
use async_stream::try_stream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Format a failure as the user-visible reply text
fn error_reply(e: &ConfabError) -> String {
    format!("Error: {}", e)
}

/// Chat reply generator
pub struct ChatEngine {
    backend: Arc<dyn LlmBackend>,
    config: GenerationConfig,
}

impl ChatEngine {
    /// Create an engine over the given backend
    pub fn new(backend: Arc<dyn LlmBackend>, config: GenerationConfig) -> Self {
        Self { backend, config }
    }

    /// The generation configuration
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate a reply for a session ending in a pending user turn
    ///
    /// The assistant turn is appended before returning, whether generation
    /// succeeded or produced an error string, so the transcript always
    /// matches what the caller displayed. Nothing is retried.
    pub async fn generate_reply(&self, session: &mut Session) -> String {
        let request = CompletionRequest::new(render_prompt(session), &self.config);

        let reply = match self.backend.complete(&request).await {
            Ok(raw) => match clean_response(&raw, self.config.show_thinking) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    warn!(backend = self.backend.name(), error = %e, "Response cleaning failed");
                    error_reply(&e)
                }
            },
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Reply generation failed");
                error_reply(&e)
            }
        };

        session.push_assistant(reply.clone());
        reply
    }

    /// Generate a reply as a stream of cleaned chunks
    ///
    /// The stream ends with an explicit `done` chunk; the caller accumulates
    /// the text and appends the assistant turn itself (or lets the pipeline
    /// do it).
    pub async fn reply_stream(&self, session: &Session) -> Result<CompletionStream> {
        let request = CompletionRequest::new(render_prompt(session), &self.config);
        let mut inner = self.backend.complete_stream(&request).await?;
        let show_thinking = self.config.show_thinking;

        let stream = try_stream! {
            let mut filter = ThinkingFilter::new(show_thinking);

            while let Some(chunk) = inner.next().await {
                let chunk = chunk?;
                let text = filter.feed(&chunk.text);

                if chunk.done {
                    let tail = filter.flush()?;
                    yield CompletionChunk { text: text + &tail, done: true };
                    break;
                }

                if !text.is_empty() {
                    yield CompletionChunk { text, done: false };
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Stage one of the two-stage protocol: reason about the pending question
    ///
    /// The question is not yet part of the session. The returned text is raw
    /// internal reasoning; it is never cleaned, shown, or stored.
    pub async fn generate_thinking(&self, session: &Session, question: &str) -> Result<String> {
        let mut prompt = render_history(session);
        prompt.push_str(&render_turn(Role::User, question));
        prompt.push_str(&render_turn(Role::System, THINKING_INSTRUCTION));
        prompt.push_str(&assistant_suffix());

        let request = CompletionRequest::new(prompt, &self.config);
        let thinking = self.backend.complete(&request).await?;

        debug!(chars = thinking.len(), "Thinking stage complete");
        Ok(thinking)
    }

    /// Stage two: answer using the stage-one reasoning
    ///
    /// The session must already contain the user question. The reasoning is
    /// embedded verbatim in a one-shot system block and discarded afterwards.
    pub async fn generate_answer(&self, session: &Session, thinking: &str) -> Result<String> {
        let mut prompt = render_history(session);
        prompt.push_str(&render_turn(Role::System, &answer_instruction(thinking)));
        prompt.push_str(&assistant_suffix());

        let request = CompletionRequest::new(prompt, &self.config);
        let raw = self.backend.complete(&request).await?;

        clean_response(&raw, self.config.show_thinking)
    }

    /// Run both stages and record only the question and the final answer
    ///
    /// Subsequent turns are built from the session alone, so the reasoning
    /// context is lost after this call. Failures in either stage become an
    /// error-string reply; the question turn is appended regardless.
    pub async fn reply_with_thinking(&self, session: &mut Session, question: &str) -> String {
        let reply = match self.generate_thinking(session, question).await {
            Ok(thinking) => {
                session.push_user(question);
                match self.generate_answer(session, &thinking).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!(error = %e, "Answer stage failed");
                        error_reply(&e)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Thinking stage failed");
                session.push_user(question);
                error_reply(&e)
            }
        };

        session.push_assistant(reply.clone());
        reply
    }
}
