//! Speech segmentation engine
//!
//! Turns a raw audio-energy/partial-transcript event stream into discrete
//! finalized utterances suitable for feeding into the conversation session
//! manager.
//!
//! # Architecture
//!
//! - **recognizer**: the offline speech-to-text contract this crate consumes
//! - **segmenter**: the pure utterance segmentation state machine
//! - **listener**: the producer/consumer loop driving recognizer, segmenter,
//!   and callbacks
//!
//! # Usage
//!
//! ```rust,ignore
//! use confab::speech::{ListenerConfig, SpeechCallbacks, SpeechListener};
//!
//! let mut listener = SpeechListener::new(recognizer, ListenerConfig::default());
//!
//! listener.start(
//!     SpeechCallbacks::new(|text| println!("You said: {}", text))
//!         .with_words(|words| print!("{} ", words)),
//! );
//!
//! // ... feed PCM frames through listener.frame_sender() ...
//!
//! listener.stop();
//! ```

pub mod listener;
pub mod recognizer;
pub mod segmenter;

// Re-export commonly used types
pub use listener::{ListenerConfig, SpeechCallbacks, SpeechListener};
pub use recognizer::Recognizer;
pub use segmenter::{frame_energy, SegmentEvent, SegmenterConfig, UtteranceSegmenter};
