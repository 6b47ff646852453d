use crate::{ConfabError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default capture block size in samples (matches the recognizer feed size)
pub const DEFAULT_BLOCK_SIZE: usize = 8000;

/// List available input devices as `(index, name)` pairs
pub fn list_microphones() -> Result<Vec<(usize, String)>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| ConfabError::DeviceError(format!("Failed to enumerate devices: {}", e)))?;

    let mut microphones = Vec::new();
    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        microphones.push((index, name));
    }

    Ok(microphones)
}

/// Find an input device by substring in its name (case insensitive)
pub fn find_device_by_name(name_substring: &str) -> Result<Option<usize>> {
    let needle = name_substring.to_lowercase();
    let device = list_microphones()?
        .into_iter()
        .find(|(_, name)| name.to_lowercase().contains(&needle));

    Ok(device.map(|(index, _)| index))
}

/// Microphone capture producing fixed-size mono 16-bit PCM blocks
pub struct AudioInput {
    device: Device,
    config: StreamConfig,
    block_size: usize,
    stream: Option<Stream>,
    is_capturing: Arc<Mutex<bool>>,
}

impl AudioInput {
    /// Create an audio input with the default input device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| ConfabError::DeviceError("No input device available".into()))?;

        Self::from_device(device)
    }

    /// Create an audio input with a specific device index
    ///
    /// Indices match [`list_microphones`].
    pub fn with_device_index(index: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .input_devices()
            .map_err(|e| ConfabError::DeviceError(format!("Failed to enumerate devices: {}", e)))?
            .nth(index)
            .ok_or_else(|| {
                ConfabError::DeviceError(format!("No input device at index {}", index))
            })?;

        Self::from_device(device)
    }

    fn from_device(device: Device) -> Result<Self> {
        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = device
            .default_input_config()
            .map_err(|e| ConfabError::DeviceError(format!("Failed to get input config: {}", e)))?
            .into();

        Ok(Self {
            device,
            config,
            block_size: DEFAULT_BLOCK_SIZE,
            stream: None,
            is_capturing: Arc::new(Mutex::new(false)),
        })
    }

    /// Set the capture block size in samples
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sample rate of the capture device
    ///
    /// Recognizers expect a fixed rate; pick a device whose rate matches the
    /// model, there is no resampling here.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Number of channels of the capture device
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start capturing and send fixed-size blocks to the provided channel
    ///
    /// Multi-channel input is downmixed to mono; samples are converted to
    /// 16-bit PCM. Blocks are dropped when the queue is full rather than
    /// blocking the audio callback.
    pub fn start_capture(&mut self, frames_tx: Sender<Vec<i16>>) -> Result<()> {
        if *self.is_capturing.lock() {
            warn!("Already capturing");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let block_size = self.block_size;
        let is_capturing = Arc::clone(&self.is_capturing);
        let mut pending: Vec<i16> = Vec::with_capacity(block_size);

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !*is_capturing.lock() {
                        return;
                    }

                    for frame in data.chunks(channels) {
                        let mono = frame.iter().sum::<f32>() / channels as f32;
                        let sample = (mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        pending.push(sample);

                        if pending.len() >= block_size {
                            let block: Vec<i16> = pending.drain(..).collect();
                            if let Err(e) = frames_tx.try_send(block) {
                                debug!("Failed to send audio block: {}", e);
                            }
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ConfabError::DeviceError(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| ConfabError::DeviceError(format!("Failed to start input stream: {}", e)))?;

        *self.is_capturing.lock() = true;
        self.stream = Some(stream);

        info!("Started audio capture");
        Ok(())
    }

    /// Stop capturing
    pub fn stop_capture(&mut self) -> Result<()> {
        *self.is_capturing.lock() = false;

        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Stopped audio capture");
        }

        Ok(())
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        *self.is_capturing.lock()
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        let _ = self.stop_capture();
    }
}
