//! Error types for speakline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Synthesis errors
    #[error("TTS backend failed to initialize: {message}")]
    BackendInit { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Voice not available: {voice}")]
    VoiceNotFound { voice: String },

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Model provisioning
    #[error("Download of {name} failed: {message}")]
    Download { name: String, message: String },

    #[error("A speech run is already active")]
    PipelineBusy,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SpeakError>;
