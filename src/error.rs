//! Error types for the Duet voice pipeline

use thiserror::Error;

/// Result type alias for Duet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
///
/// End-of-stream is not an error: frame sources signal it with `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup, never retried)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or failed mid-session
    #[error("device error: {0}")]
    Device(String),

    /// Network stream failed mid-flight (synthesis, transcription)
    #[error("stream error: {0}")]
    Stream(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Wake word gate error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Chat completion error
    #[error("chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Whether the orchestration loop may retry after this error.
    ///
    /// Only configuration errors are fatal; everything else aborts the
    /// current interaction and the loop returns to the wake-word gate
    /// after a fixed backoff.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
