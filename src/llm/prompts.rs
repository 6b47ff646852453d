//! System prompts for the session manager
//!
//! The two-stage instructions are one-shot system blocks appended to the
//! rendered history; they are never stored in the session itself.

/// Default system preamble for a freshly seeded session
pub const SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that provides clear, accurate, and thoughtful responses.";

/// Stage-one instruction: reason broadly about the pending question
///
/// The output of this pass is internal and is never shown to the user.
pub const THINKING_INSTRUCTION: &str = "Think deeply about the user's latest question in the \
context of the entire conversation. Consider all relevant information from previous exchanges.";

/// Stage-two instruction embedding the stage-one reasoning verbatim
pub fn answer_instruction(thinking: &str) -> String {
    format!(
        "Below is your detailed thinking about the user's question. Use this analysis to \
         provide a clear, concise, and helpful answer. Do not mention that you've done this \
         thinking process.\n\n{}",
        thinking
    )
}
