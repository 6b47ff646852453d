//! Audio capture
//!
//! Microphone input behind the `audio-io` feature; everything downstream of
//! the frame channel works without hardware.

#[cfg(feature = "audio-io")]
pub mod input;

#[cfg(feature = "audio-io")]
pub use input::{find_device_by_name, list_microphones, AudioInput, DEFAULT_BLOCK_SIZE};
