//! Error types for the outpost node

use thiserror::Error;

/// Result type alias for outpost operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the outpost node
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable sample rate could be negotiated with the capture device
    #[error("device unsupported: {0}")]
    DeviceUnsupported(String),

    /// Wake word model file is missing from the model directory
    #[error("wake word model not found: {0}")]
    ModelNotFound(String),

    /// Audio capture/format error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word engine error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Voice activity classification error
    #[error("voice activity error: {0}")]
    VoiceActivity(String),

    /// Hub became unreachable; the in-flight utterance was dropped
    #[error("hub connectivity lost: {0}")]
    Connectivity(String),

    /// Hub answered with an unexpected status or malformed body
    #[error("hub protocol error: {0}")]
    Protocol(String),

    /// Playback failed on both the primary and fallback paths
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encode/decode error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
