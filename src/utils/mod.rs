pub mod channels;

pub use channels::SpeechChannels;
