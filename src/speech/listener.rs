//! Speech listening loop
//!
//! Wires audio frames, the recognizer, and the segmenter together: frames
//! arrive on a bounded channel from the capture thread (or any test source);
//! a single consumer thread drains them, computes frame energy, polls the
//! recognizer for partials at the configured rate, and invokes callbacks
//! synchronously on that thread. Callbacks must not block significantly and
//! must not call back into the listener, or they stall transcription.

use crate::speech::recognizer::Recognizer;
use crate::speech::segmenter::{frame_energy, SegmentEvent, SegmenterConfig, UtteranceSegmenter};
use crate::utils::channels::SpeechChannels;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the listening loop
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Segmentation parameters
    pub segmenter: SegmenterConfig,

    /// Capacity of the bounded frame queue
    pub queue_capacity: usize,

    /// How long the consumer waits for a frame before re-checking the stop
    /// flag
    pub frame_timeout: Duration,

    /// Upper bound on how long `stop()` waits for the consumer to exit
    pub join_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            queue_capacity: 32,
            frame_timeout: Duration::from_millis(500),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Callbacks invoked on the consumer thread
pub struct SpeechCallbacks {
    /// Required: receives each finalized utterance
    pub on_final: Box<dyn FnMut(String) + Send>,

    /// Optional: receives the full partial transcript on every change
    pub on_partial: Option<Box<dyn FnMut(String) + Send>>,

    /// Optional: receives newly spoken words (or the full rewritten text)
    pub on_words: Option<Box<dyn FnMut(String) + Send>>,
}

impl SpeechCallbacks {
    /// Callbacks with only a finalization handler
    pub fn new(on_final: impl FnMut(String) + Send + 'static) -> Self {
        Self {
            on_final: Box::new(on_final),
            on_partial: None,
            on_words: None,
        }
    }

    /// Add a partial-transcript handler
    pub fn with_partial(mut self, on_partial: impl FnMut(String) + Send + 'static) -> Self {
        self.on_partial = Some(Box::new(on_partial));
        self
    }

    /// Add a word-delta handler
    pub fn with_words(mut self, on_words: impl FnMut(String) + Send + 'static) -> Self {
        self.on_words = Some(Box::new(on_words));
        self
    }
}

/// State shared between the consumer thread and `stop()`
struct Shared {
    segmenter: UtteranceSegmenter,
    callbacks: Option<SpeechCallbacks>,
}

impl Shared {
    fn dispatch(&mut self, events: Vec<SegmentEvent>) {
        let Some(callbacks) = self.callbacks.as_mut() else {
            return;
        };

        for event in events {
            match event {
                SegmentEvent::Final(text) => (callbacks.on_final)(text),
                SegmentEvent::Partial(text) => {
                    if let Some(cb) = callbacks.on_partial.as_mut() {
                        cb(text);
                    }
                }
                SegmentEvent::Words(text) => {
                    if let Some(cb) = callbacks.on_words.as_mut() {
                        cb(text);
                    }
                }
            }
        }
    }
}

/// Speech listener over a recognizer and a frame source
pub struct SpeechListener<R: Recognizer + 'static> {
    config: ListenerConfig,
    recognizer: Arc<Mutex<R>>,
    shared: Arc<Mutex<Shared>>,
    frames_tx: Sender<Vec<i16>>,
    frames_rx: Receiver<Vec<i16>>,
    stop_flag: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
}

impl<R: Recognizer + 'static> SpeechListener<R> {
    /// Create a listener over the given recognizer
    pub fn new(recognizer: R, config: ListenerConfig) -> Self {
        let channels = SpeechChannels::new(config.queue_capacity);
        let segmenter = UtteranceSegmenter::new(config.segmenter.clone());

        Self {
            config,
            recognizer: Arc::new(Mutex::new(recognizer)),
            shared: Arc::new(Mutex::new(Shared {
                segmenter,
                callbacks: None,
            })),
            frames_tx: channels.frames_tx,
            frames_rx: channels.frames_rx,
            stop_flag: Arc::new(AtomicBool::new(true)),
            consumer: None,
        }
    }

    /// Sender for raw PCM frames (the producer side of the queue)
    pub fn frame_sender(&self) -> Sender<Vec<i16>> {
        self.frames_tx.clone()
    }

    /// Whether the consumer thread is running
    pub fn is_listening(&self) -> bool {
        self.consumer
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start listening
    ///
    /// Idempotent: starting while already listening is a no-op that returns
    /// `false` with a warning.
    pub fn start(&mut self, callbacks: SpeechCallbacks) -> bool {
        if self.is_listening() {
            warn!("Already listening");
            return false;
        }

        {
            let mut shared = self.shared.lock();
            shared.segmenter.reset();
            shared.callbacks = Some(callbacks);
        }

        // A fresh flag per run: a previous consumer that outlived its join
        // timeout keeps the old one and winds down on its own
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = stop_flag.clone();

        let shared = self.shared.clone();
        let recognizer = self.recognizer.clone();
        let frames_rx = self.frames_rx.clone();
        let frame_timeout = self.config.frame_timeout;

        let handle = std::thread::Builder::new()
            .name("speech-consumer".to_string())
            .spawn(move || {
                info!("Speech consumer started");
                consume_frames(frames_rx, recognizer, shared, stop_flag, frame_timeout);
                info!("Speech consumer stopped");
            });

        match handle {
            Ok(handle) => {
                self.consumer = Some(handle);
                true
            }
            Err(e) => {
                warn!("Failed to spawn speech consumer: {}", e);
                self.shared.lock().callbacks = None;
                false
            }
        }
    }

    /// Stop listening
    ///
    /// Idempotent: stopping while not listening is a no-op with a warning.
    /// A pending partial utterance is finalized through `on_final` exactly
    /// once before teardown. Blocks at most `join_timeout` waiting for the
    /// consumer thread.
    pub fn stop(&mut self) {
        if !self.is_listening() {
            warn!("Not currently listening");
            return;
        }

        // Never lose an in-progress utterance
        {
            let mut shared = self.shared.lock();
            if let Some(event) = shared.segmenter.finalize() {
                shared.dispatch(vec![event]);
            }
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = self.consumer.take() {
            let deadline = Instant::now() + self.config.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Speech consumer did not stop within the join timeout");
            }
        }

        let mut shared = self.shared.lock();
        shared.callbacks = None;
        shared.segmenter.reset();
    }
}

impl<R: Recognizer + 'static> Drop for SpeechListener<R> {
    fn drop(&mut self) {
        if self.is_listening() {
            self.stop();
        }
    }
}

/// Consumer loop: drain frames, drive the segmenter, invoke callbacks
fn consume_frames<R: Recognizer>(
    frames_rx: Receiver<Vec<i16>>,
    recognizer: Arc<Mutex<R>>,
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    frame_timeout: Duration,
) {
    while !stop_flag.load(Ordering::SeqCst) {
        let frame = match frames_rx.recv_timeout(frame_timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Frame channel disconnected");
                break;
            }
        };

        let now = Instant::now();
        let energy = frame_energy(&frame);

        let mut events = Vec::new();
        let should_poll;
        {
            let mut guard = shared.lock();
            if let Some(event) = guard.segmenter.observe_energy(energy, now) {
                events.push(event);
            }
            should_poll = guard.segmenter.should_poll_partial(now);
        }

        if should_poll {
            match recognizer.lock().partial_result() {
                Ok(partial) => {
                    events.extend(shared.lock().segmenter.accept_partial(&partial, now));
                }
                Err(e) => warn!("Partial result error: {}", e),
            }
        }

        match recognizer.lock().accept_waveform(&frame) {
            Ok(true) => match recognizer.lock().final_result() {
                Ok(text) => {
                    if let Some(event) = shared.lock().segmenter.accept_final(&text) {
                        events.push(event);
                    }
                }
                Err(e) => warn!("Final result error: {}", e),
            },
            Ok(false) => {}
            Err(e) => {
                warn!("Error processing audio: {}", e);
                continue;
            }
        }

        if !events.is_empty() {
            shared.lock().dispatch(events);
        }
    }
}
