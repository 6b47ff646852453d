pub mod audio;
pub mod llm;
pub mod speech;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConfabError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Backend protocol error: {0}")]
    BackendProtocolError(String),

    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<reqwest::Error> for ConfabError {
    fn from(e: reqwest::Error) -> Self {
        ConfabError::TransportError(e.to_string())
    }
}

impl From<serde_json::Error> for ConfabError {
    fn from(e: serde_json::Error) -> Self {
        ConfabError::BackendProtocolError(e.to_string())
    }
}

impl ConfabError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Network failures are typically transient
            ConfabError::TransportError(_) => true,
            // A malformed response from one request does not poison the next
            ConfabError::BackendProtocolError(_) => true,
            // The backend will finish loading eventually
            ConfabError::ModelNotReady(_) => true,
            // Hardware/device errors may require user intervention
            ConfabError::DeviceError(_) => false,
            ConfabError::AudioProcessingError(_) => true,
            // Config errors require user intervention
            ConfabError::ConfigError(_) => false,
            // Channel errors indicate internal issues
            ConfabError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ConfabError::TransportError(_) => {
                "Could not reach the inference server. Please check the connection.".to_string()
            }
            ConfabError::BackendProtocolError(_) => {
                "The inference server returned an unexpected response.".to_string()
            }
            ConfabError::ModelNotReady(_) => {
                "The model is still loading. Please try again shortly.".to_string()
            }
            ConfabError::DeviceError(_) => {
                "Audio device error. Please check your microphone.".to_string()
            }
            ConfabError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            ConfabError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ConfabError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfabError>;
