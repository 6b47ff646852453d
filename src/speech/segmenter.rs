//! Utterance segmentation state machine
//!
//! Decides when a spoken utterance is complete from a stream of frame
//! energies and partial transcripts. The machine is pure: every entry point
//! takes the current time, so tests drive it with a synthetic clock and no
//! audio hardware.
//!
//! Finalization happens on one of three paths: the silence timeout elapses
//! with pending partial text, the recognizer itself reports a final result,
//! or the owner calls [`UtteranceSegmenter::finalize`] on stop. The
//! silent-frame-count fallback only marks speech as no longer active; the
//! timeout check runs first and is the only energy-driven path that emits,
//! and clearing the pending text on emission guarantees exactly-once
//! finalization.

use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for utterance segmentation
#[derive(Clone, Debug)]
pub struct SegmenterConfig {
    /// Energy level below which a frame counts as silence
    pub silence_threshold: f32,

    /// Silence duration that finalizes a pending utterance
    pub silence_timeout: Duration,

    /// Consecutive silent frames after which speech is considered over
    /// (coarser fallback; does not emit)
    pub silent_frame_threshold: u32,

    /// Minimum interval between partial-result polls
    pub partial_delay: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.03,
            silence_timeout: Duration::from_secs(2),
            silent_frame_threshold: 30,
            partial_delay: Duration::from_millis(100),
        }
    }
}

impl SegmenterConfig {
    /// Set the silence energy threshold
    pub fn with_silence_threshold(mut self, threshold: f32) -> Self {
        self.silence_threshold = threshold;
        self
    }

    /// Set the silence timeout
    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    /// Set the silent-frame fallback threshold
    pub fn with_silent_frame_threshold(mut self, frames: u32) -> Self {
        self.silent_frame_threshold = frames;
        self
    }

    /// Set the partial polling interval
    pub fn with_partial_delay(mut self, delay: Duration) -> Self {
        self.partial_delay = delay;
        self
    }
}

/// An event produced by the segmenter
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentEvent {
    /// The full current partial transcript
    Partial(String),

    /// The newly spoken words since the previous partial, or the whole new
    /// text when the recognizer rewrote earlier words
    Words(String),

    /// A finalized utterance
    Final(String),
}

/// Normalized mean-absolute energy of a PCM frame
pub fn frame_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| (s as f64).abs() / i16::MAX as f64)
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Speech-activity and utterance-boundary tracker
#[derive(Clone, Debug)]
pub struct UtteranceSegmenter {
    config: SegmenterConfig,

    /// Speech has been detected and not yet concluded
    speech_active: bool,

    /// Consecutive below-threshold frames since speech was last active
    silent_frames: u32,

    /// When the current run of silence began
    silence_start: Option<Instant>,

    /// Current best partial transcript, pending finalization
    last_partial: String,

    /// When a partial poll last happened
    last_partial_at: Option<Instant>,
}

impl UtteranceSegmenter {
    /// Create a segmenter with the given configuration
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            speech_active: false,
            silent_frames: 0,
            silence_start: None,
            last_partial: String::new(),
            last_partial_at: None,
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Whether speech is currently considered active
    pub fn is_speech_active(&self) -> bool {
        self.speech_active
    }

    /// The pending partial transcript, if any
    pub fn pending_partial(&self) -> &str {
        &self.last_partial
    }

    /// Feed one frame's energy reading
    ///
    /// Returns a [`SegmentEvent::Final`] when the silence timeout concludes
    /// a pending utterance.
    pub fn observe_energy(&mut self, energy: f32, now: Instant) -> Option<SegmentEvent> {
        if energy > self.config.silence_threshold {
            self.speech_active = true;
            self.silent_frames = 0;
            self.silence_start = None;
            return None;
        }

        if !self.speech_active {
            return None;
        }

        self.silent_frames += 1;
        if self.silent_frames == 1 {
            self.silence_start = Some(now);
        }

        // Timeout first: the only energy-driven path that emits
        if let Some(start) = self.silence_start {
            if now.duration_since(start) > self.config.silence_timeout {
                let text = self.last_partial.trim().to_string();
                if !text.is_empty() {
                    debug!(
                        "Silence of {:?} - completing utterance: '{}'",
                        self.config.silence_timeout, text
                    );
                    self.last_partial.clear();
                    self.silence_start = None;
                    self.speech_active = false;
                    self.silent_frames = 0;
                    return Some(SegmentEvent::Final(text));
                }
            }
        }

        // Coarser frame-count fallback: deactivate without emitting
        if self.silent_frames > self.config.silent_frame_threshold {
            self.speech_active = false;
        }

        None
    }

    /// Whether a partial-result poll is due
    ///
    /// Polling is only worthwhile while speech is active, and is bounded to
    /// one poll per `partial_delay`.
    pub fn should_poll_partial(&self, now: Instant) -> bool {
        if !self.speech_active {
            return false;
        }
        match self.last_partial_at {
            Some(at) => now.duration_since(at) > self.config.partial_delay,
            None => true,
        }
    }

    /// Accept a polled partial transcript
    ///
    /// Emits a word delta (the suffix when the new text extends the previous
    /// partial as a prefix, the whole text otherwise) plus the full partial,
    /// and remembers the text for finalization. Unchanged or empty partials
    /// produce nothing but still stamp the poll clock.
    pub fn accept_partial(&mut self, text: &str, now: Instant) -> Vec<SegmentEvent> {
        self.last_partial_at = Some(now);

        let text = text.trim();
        if text.is_empty() || text == self.last_partial {
            return Vec::new();
        }

        let mut events = Vec::new();

        if !self.last_partial.is_empty() && text.starts_with(self.last_partial.as_str()) {
            let new_words = text[self.last_partial.len()..].trim();
            if !new_words.is_empty() {
                events.push(SegmentEvent::Words(new_words.to_string()));
            }
        } else {
            // The recognizer corrected earlier words; resend everything
            events.push(SegmentEvent::Words(text.to_string()));
        }

        events.push(SegmentEvent::Partial(text.to_string()));
        self.last_partial = text.to_string();

        events
    }

    /// Accept a recognizer-side final result
    ///
    /// Clears the pending partial; emits when the text is non-empty.
    pub fn accept_final(&mut self, text: &str) -> Option<SegmentEvent> {
        self.last_partial.clear();

        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(SegmentEvent::Final(text.to_string()))
        }
    }

    /// Finalize any pending partial (used on stop)
    ///
    /// Guarantees no in-progress utterance is silently lost; emits at most
    /// once because the pending text is cleared.
    pub fn finalize(&mut self) -> Option<SegmentEvent> {
        let text = self.last_partial.trim().to_string();
        self.last_partial.clear();
        self.silence_start = None;
        self.speech_active = false;
        self.silent_frames = 0;

        if text.is_empty() {
            None
        } else {
            debug!("Finalizing utterance on stop: '{}'", text);
            Some(SegmentEvent::Final(text))
        }
    }

    /// Reset to initial state
    pub fn reset(&mut self) {
        self.speech_active = false;
        self.silent_frames = 0;
        self.silence_start = None;
        self.last_partial.clear();
        self.last_partial_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SegmenterConfig {
        SegmenterConfig::default()
            .with_silence_timeout(Duration::from_millis(200))
            .with_partial_delay(Duration::from_millis(10))
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_energy_of_silence_and_speech() {
        assert_eq!(frame_energy(&[]), 0.0);
        assert_eq!(frame_energy(&[0, 0, 0]), 0.0);
        assert!(frame_energy(&[8000, -8000, 8000]) > 0.03);
        assert!(frame_energy(&[50, -50, 50]) < 0.03);
    }

    #[test]
    fn test_silence_timeout_finalizes_exactly_once() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        // Speech for a few frames, with a partial accumulating
        for i in 0..5 {
            assert_eq!(seg.observe_energy(0.5, at(base, i * 10)), None);
        }
        seg.accept_partial("hello there", at(base, 50));
        assert!(seg.is_speech_active());

        // Quiet frames; nothing until the timeout elapses
        assert_eq!(seg.observe_energy(0.0, at(base, 100)), None);
        assert_eq!(seg.observe_energy(0.0, at(base, 200)), None);

        let event = seg.observe_energy(0.0, at(base, 350));
        assert_eq!(event, Some(SegmentEvent::Final("hello there".to_string())));
        assert!(!seg.is_speech_active());

        // Further silence never re-emits
        assert_eq!(seg.observe_energy(0.0, at(base, 400)), None);
        assert_eq!(seg.observe_energy(0.0, at(base, 1000)), None);
    }

    #[test]
    fn test_speech_resumption_resets_silence_timer() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        seg.observe_energy(0.5, at(base, 0));
        seg.accept_partial("hold on", at(base, 5));

        seg.observe_energy(0.0, at(base, 10));
        // Speech resumes before the timeout
        seg.observe_energy(0.5, at(base, 100));

        // Silence restarts; the old silence start must not count
        assert_eq!(seg.observe_energy(0.0, at(base, 250)), None);
        let event = seg.observe_energy(0.0, at(base, 500));
        assert_eq!(event, Some(SegmentEvent::Final("hold on".to_string())));
    }

    #[test]
    fn test_timeout_without_partial_text_stays_pending() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        seg.observe_energy(0.5, at(base, 0));
        assert_eq!(seg.observe_energy(0.0, at(base, 10)), None);
        // Timeout elapsed but there is nothing to emit
        assert_eq!(seg.observe_energy(0.0, at(base, 400)), None);
        assert!(seg.is_speech_active());
    }

    #[test]
    fn test_frame_count_fallback_deactivates_without_emitting() {
        let config = quick_config()
            .with_silence_timeout(Duration::from_secs(60))
            .with_silent_frame_threshold(3);
        let mut seg = UtteranceSegmenter::new(config);
        let base = Instant::now();

        seg.observe_energy(0.5, at(base, 0));
        seg.accept_partial("pending words", at(base, 1));

        for i in 0..10 {
            assert_eq!(seg.observe_energy(0.0, at(base, 10 + i)), None);
        }

        // Deactivated, but the pending text survives for stop()
        assert!(!seg.is_speech_active());
        assert_eq!(seg.pending_partial(), "pending words");
    }

    #[test]
    fn test_word_deltas() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();
        seg.observe_energy(0.5, base);

        let events = seg.accept_partial("hello", at(base, 20));
        assert_eq!(
            events,
            vec![
                SegmentEvent::Words("hello".to_string()),
                SegmentEvent::Partial("hello".to_string()),
            ]
        );

        let events = seg.accept_partial("hello there", at(base, 40));
        assert_eq!(
            events,
            vec![
                SegmentEvent::Words("there".to_string()),
                SegmentEvent::Partial("hello there".to_string()),
            ]
        );

        // Not a prefix extension: the recognizer rewrote earlier words
        let events = seg.accept_partial("hi", at(base, 60));
        assert_eq!(
            events,
            vec![
                SegmentEvent::Words("hi".to_string()),
                SegmentEvent::Partial("hi".to_string()),
            ]
        );
    }

    #[test]
    fn test_unchanged_partial_emits_nothing() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();
        seg.observe_energy(0.5, base);

        seg.accept_partial("same text", at(base, 20));
        let events = seg.accept_partial("same text", at(base, 40));
        assert!(events.is_empty());
    }

    #[test]
    fn test_partial_polling_is_rate_limited() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        // No polling while idle
        assert!(!seg.should_poll_partial(base));

        seg.observe_energy(0.5, base);
        assert!(seg.should_poll_partial(at(base, 1)));

        seg.accept_partial("words", at(base, 1));
        assert!(!seg.should_poll_partial(at(base, 5)));
        assert!(seg.should_poll_partial(at(base, 20)));
    }

    #[test]
    fn test_finalize_on_stop_emits_once() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        seg.observe_energy(0.5, base);
        seg.accept_partial("cut short", at(base, 10));

        assert_eq!(
            seg.finalize(),
            Some(SegmentEvent::Final("cut short".to_string()))
        );
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_recognizer_final_clears_pending() {
        let mut seg = UtteranceSegmenter::new(quick_config());
        let base = Instant::now();

        seg.observe_energy(0.5, base);
        seg.accept_partial("almost done", at(base, 10));

        let event = seg.accept_final("almost done now");
        assert_eq!(
            event,
            Some(SegmentEvent::Final("almost done now".to_string()))
        );

        // Nothing left for stop() to drain
        assert_eq!(seg.finalize(), None);
    }
}
