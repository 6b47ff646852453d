//! ChatML prompt framing
//!
//! Renders a `Session` into the single prompt string chat-tuned models expect
//! and parses such a string back into turns. The begin/end role delimiters are
//! a protocol contract with the model; a mismatch silently produces garbled
//! completions, so the exact framing lives here and nowhere else.

use crate::llm::session::{Role, Session, Turn};
use crate::{ConfabError, Result};

/// Opening role delimiter
pub const ROLE_START: &str = "<|im_start|>";

/// Closing role delimiter
pub const ROLE_END: &str = "<|im_end|>";

/// Render a single role-tagged block
pub fn render_turn(role: Role, text: &str) -> String {
    format!("{}{}\n{}{}\n", ROLE_START, role.as_str(), text, ROLE_END)
}

/// The open assistant block that signals the model to continue generation
pub fn assistant_suffix() -> String {
    format!("{}assistant\n", ROLE_START)
}

/// Render a session's turns without the generation suffix
///
/// Used when extra one-shot blocks are appended before the suffix.
pub fn render_history(session: &Session) -> String {
    let mut prompt = String::new();
    for turn in session.turns() {
        prompt.push_str(&render_turn(turn.role, &turn.text));
    }
    prompt
}

/// Render a session into a complete prompt
///
/// Concatenates every turn as `<|im_start|>{role}\n{text}<|im_end|>\n` in
/// order, then appends the open `<|im_start|>assistant\n` suffix with no
/// closing marker.
pub fn render_prompt(session: &Session) -> String {
    let mut prompt = render_history(session);
    prompt.push_str(&assistant_suffix());
    prompt
}

/// Parse a rendered prompt back into ordered turns
///
/// The trailing open assistant block (no closing marker, empty body) is
/// recognized and dropped. Any other unterminated block, or an unknown role
/// tag, is a protocol error. Round-trips with [`render_prompt`] as long as no
/// turn text contains the delimiters themselves.
pub fn parse_prompt(prompt: &str) -> Result<Vec<Turn>> {
    let mut turns = Vec::new();

    let mut segments = prompt.split(ROLE_START);

    // Text before the first delimiter is not part of any block
    let leading = segments.next().unwrap_or("");
    if !leading.is_empty() {
        return Err(ConfabError::BackendProtocolError(format!(
            "unexpected text before first role block: {:?}",
            leading
        )));
    }

    let mut pending_open = false;
    for segment in segments {
        if pending_open {
            return Err(ConfabError::BackendProtocolError(
                "open role block before end of prompt".to_string(),
            ));
        }

        let (role_line, rest) = segment.split_once('\n').ok_or_else(|| {
            ConfabError::BackendProtocolError(format!("role block missing newline: {:?}", segment))
        })?;

        let role = Role::from_str(role_line).ok_or_else(|| {
            ConfabError::BackendProtocolError(format!("unknown role tag: {:?}", role_line))
        })?;

        match rest.split_once(ROLE_END) {
            Some((text, trailer)) => {
                if !trailer.is_empty() && trailer != "\n" {
                    return Err(ConfabError::BackendProtocolError(format!(
                        "unexpected text after role block: {:?}",
                        trailer
                    )));
                }
                turns.push(Turn::new(role, text));
            }
            None => {
                // Only the generation suffix may be left open
                if role == Role::Assistant && rest.is_empty() {
                    pending_open = true;
                } else {
                    return Err(ConfabError::BackendProtocolError(format!(
                        "unterminated {} block",
                        role.as_str()
                    )));
                }
            }
        }
    }

    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_format() {
        let mut session = Session::with_system("Be terse.");
        session.push_user("2+2?");

        let prompt = render_prompt(&session);
        assert_eq!(
            prompt,
            "<|im_start|>system\nBe terse.<|im_end|>\n\
             <|im_start|>user\n2+2?<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let mut session = Session::with_system("You are a helpful assistant.");
        session.push_user("Hello");
        session.push_assistant("Hi! How can I help?");
        session.push_user("What's 2+2?");

        let prompt = render_prompt(&session);
        let parsed = parse_prompt(&prompt).unwrap();

        assert_eq!(parsed, session.turns());
    }

    #[test]
    fn test_round_trip_empty_session() {
        let session = Session::empty();
        let parsed = parse_prompt(&render_prompt(&session)).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_multiline_text_round_trip() {
        let mut session = Session::empty();
        session.push_user("line one\nline two\n\nline four");

        let parsed = parse_prompt(&render_prompt(&session)).unwrap();
        assert_eq!(parsed, session.turns());
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let err = parse_prompt("<|im_start|>narrator\nhm<|im_end|>\n").unwrap_err();
        assert!(matches!(err, ConfabError::BackendProtocolError(_)));
    }

    #[test]
    fn test_parse_rejects_unterminated_user_block() {
        let err = parse_prompt("<|im_start|>user\ndangling").unwrap_err();
        assert!(matches!(err, ConfabError::BackendProtocolError(_)));
    }

    #[test]
    fn test_parse_ignores_generation_suffix() {
        let parsed =
            parse_prompt("<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].text, "hi");
    }

    #[test]
    fn test_parse_rejects_leading_text() {
        let err = parse_prompt("stray<|im_start|>user\nhi<|im_end|>\n").unwrap_err();
        assert!(matches!(err, ConfabError::BackendProtocolError(_)));
    }
}
