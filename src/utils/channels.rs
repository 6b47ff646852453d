use crossbeam_channel::{bounded, Receiver, Sender};

/// Channel pair carrying raw PCM frames from capture to the consumer thread
pub struct SpeechChannels {
    pub frames_tx: Sender<Vec<i16>>,
    pub frames_rx: Receiver<Vec<i16>>,
}

impl SpeechChannels {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, frames_rx) = bounded(capacity);

        Self {
            frames_tx,
            frames_rx,
        }
    }
}

impl Default for SpeechChannels {
    fn default() -> Self {
        Self::new(32)
    }
}
