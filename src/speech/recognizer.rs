//! Offline speech-to-text recognizer contract
//!
//! The segmentation engine is recognizer-agnostic: any offline engine that
//! can consume raw PCM and report partial/final transcripts plugs in here.
//! The crate ships no engine binding of its own.

use crate::Result;

/// An offline streaming speech recognizer
///
/// Implementations consume mono 16-bit PCM at a fixed sample rate. A
/// recognizer whose model has not finished loading reports
/// [`ConfabError::ModelNotReady`](crate::ConfabError::ModelNotReady);
/// a missing or unusable model file is a
/// [`ConfabError::DeviceError`](crate::ConfabError::DeviceError) and must
/// surface before any listening is attempted.
pub trait Recognizer: Send {
    /// Feed one block of audio
    ///
    /// Returns `true` when a final result is ready to be read with
    /// [`Recognizer::final_result`].
    fn accept_waveform(&mut self, audio: &[i16]) -> Result<bool>;

    /// Current best in-progress transcript (may be empty)
    fn partial_result(&mut self) -> Result<String>;

    /// The finalized transcript for the segment just completed
    fn final_result(&mut self) -> Result<String>;
}
