//! Inline reasoning-block cleaning for model output
//!
//! Some backends emit their chain-of-thought inline, delimited by paired
//! `<think>`/`</think>` markers. This module strips those spans (default) or
//! rewrites them as visually separated blocks, both on complete responses and
//! token-by-token while streaming, handling markers split across chunk
//! boundaries.

use crate::{ConfabError, Result};

/// Opening reasoning delimiter
pub const THINK_OPEN: &str = "<think>";

/// Closing reasoning delimiter
pub const THINK_CLOSE: &str = "</think>";

/// Heading inserted for a kept reasoning block
const THINKING_HEADER: &str = "\n--- THINKING ---\n";

/// Trailer inserted after a kept reasoning block
const THINKING_FOOTER: &str = "\n--- END THINKING ---\n";

/// Clean a complete response
///
/// With `show_thinking` false, every `<think>…</think>` span is removed; with
/// it true, the delimiters are replaced by separator lines and the reasoning
/// text is kept. Leading whitespace is always trimmed afterwards, which makes
/// cleaning idempotent on delimiter-free input. An opening delimiter with no
/// matching close is a protocol error.
pub fn clean_response(text: &str, show_thinking: bool) -> Result<String> {
    // Every open must be terminated before we rewrite anything
    let mut scan = text;
    while let Some(open) = scan.find(THINK_OPEN) {
        let after_open = &scan[open + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close) => scan = &after_open[close + THINK_CLOSE.len()..],
            None => {
                return Err(ConfabError::BackendProtocolError(
                    "unterminated <think> block in model output".to_string(),
                ))
            }
        }
    }

    let cleaned = if show_thinking {
        text.replace(THINK_OPEN, THINKING_HEADER)
            .replace(THINK_CLOSE, THINKING_FOOTER)
    } else {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find(THINK_OPEN) {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + THINK_OPEN.len()..];
            // Guaranteed present by the scan above
            let close = after_open.find(THINK_CLOSE).unwrap_or(after_open.len());
            rest = &after_open[(close + THINK_CLOSE.len()).min(after_open.len())..];
        }
        out.push_str(rest);
        out
    };

    Ok(cleaned.trim_start().to_string())
}

/// Filter state relative to the delimiters
#[derive(Clone, Debug, PartialEq)]
enum FilterState {
    /// Outside any reasoning block
    Outside,
    /// Inside a reasoning block
    Inside,
}

/// Streaming filter for reasoning blocks
///
/// Feed chunks as they arrive; the returned fragments are the user-visible
/// text with reasoning spans stripped (or annotated when `show_thinking` is
/// set). Partial delimiters at a chunk boundary are carried until the next
/// chunk decides them. Call [`ThinkingFilter::flush`] once the response is
/// complete.
#[derive(Clone, Debug)]
pub struct ThinkingFilter {
    state: FilterState,

    /// Trailing bytes that might be the start of a delimiter
    pending: String,

    /// Keep reasoning text, annotated, instead of dropping it
    show_thinking: bool,

    /// Set once any non-empty fragment has been emitted; gates the leading
    /// whitespace trim
    emitted: bool,
}

impl ThinkingFilter {
    /// Create a new filter
    pub fn new(show_thinking: bool) -> Self {
        Self {
            state: FilterState::Outside,
            pending: String::new(),
            show_thinking,
            emitted: false,
        }
    }

    /// Reset to initial state for a new response
    pub fn reset(&mut self) {
        self.state = FilterState::Outside;
        self.pending.clear();
        self.emitted = false;
    }

    /// Whether the filter is currently inside a reasoning block
    pub fn is_inside_thinking(&self) -> bool {
        self.state == FilterState::Inside
    }

    /// Feed one chunk, returning the user-visible text it produced
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.push_str(chunk);

        let mut out = String::new();

        loop {
            let marker = match self.state {
                FilterState::Outside => THINK_OPEN,
                FilterState::Inside => THINK_CLOSE,
            };

            match buffer.find(marker) {
                Some(pos) => {
                    let before = &buffer[..pos];
                    match self.state {
                        FilterState::Outside => {
                            self.emit(&mut out, before);
                            if self.show_thinking {
                                self.emit(&mut out, THINKING_HEADER);
                            }
                            self.state = FilterState::Inside;
                        }
                        FilterState::Inside => {
                            if self.show_thinking {
                                self.emit(&mut out, before);
                                self.emit(&mut out, THINKING_FOOTER);
                            }
                            self.state = FilterState::Outside;
                        }
                    }
                    buffer.drain(..pos + marker.len());
                }
                None => {
                    // Hold back any tail that could still become the marker
                    let keep = partial_marker_suffix(&buffer, marker);
                    let safe_len = buffer.len() - keep;
                    let safe = &buffer[..safe_len];
                    match self.state {
                        FilterState::Outside => self.emit(&mut out, safe),
                        FilterState::Inside => {
                            if self.show_thinking {
                                self.emit(&mut out, safe);
                            }
                        }
                    }
                    self.pending = buffer[safe_len..].to_string();
                    break;
                }
            }
        }

        out
    }

    /// Finish the response, returning any withheld text
    ///
    /// An unterminated reasoning block is a protocol error rather than
    /// silently consuming the rest of the output.
    pub fn flush(&mut self) -> Result<String> {
        if self.state == FilterState::Inside {
            return Err(ConfabError::BackendProtocolError(
                "unterminated <think> block in model output".to_string(),
            ));
        }

        let pending = std::mem::take(&mut self.pending);
        let mut out = String::new();
        self.emit(&mut out, &pending);
        Ok(out)
    }

    /// Append a fragment, trimming leading whitespace until the first
    /// non-empty emission
    fn emit(&mut self, out: &mut String, fragment: &str) {
        let fragment = if self.emitted {
            fragment
        } else {
            fragment.trim_start()
        };
        if !fragment.is_empty() {
            self.emitted = true;
            out.push_str(fragment);
        }
    }
}

/// Length of the longest buffer suffix that is a proper prefix of `marker`
fn partial_marker_suffix(buffer: &str, marker: &str) -> usize {
    let max = marker.len().saturating_sub(1).min(buffer.len());
    for len in (1..=max).rev() {
        if buffer.is_char_boundary(buffer.len() - len)
            && marker.starts_with(&buffer[buffer.len() - len..])
        {
            return len;
        }
    }
    0
}
