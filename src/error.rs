use thiserror::Error;

/// Main error type for the analyzer.
///
/// Only fatal conditions live here. Transform and feature failures are
/// absorbed into the [`AnalysisRecord`](crate::pipeline::AnalysisRecord)
/// and never surface through this type.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Audio loading error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Fatal errors raised while turning encoded bytes into an [`AudioBuffer`](crate::audio::AudioBuffer)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Could not decode audio: {reason}")]
    Decode { reason: String },

    #[error("Audio too long: {duration:.2}s (max {limit:.1}s)")]
    DurationExceeded { duration: f64, limit: f64 },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("File too large: {size} bytes (max {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },
}

/// Local failure of a single transform generator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("insufficient samples: {available} available, {required} required")]
    InsufficientSamples { available: usize, required: usize },

    #[error("insufficient frames: {available} available, at least {required} required")]
    InsufficientFrames { available: usize, required: usize },

    #[error("numerically degenerate input: {reason}")]
    Degenerate { reason: String },

    #[error("cancelled before completion")]
    Cancelled,

    #[error("FFT processing failed: {reason}")]
    Fft { reason: String },

    #[error("image rendering failed: {reason}")]
    Render { reason: String },
}

/// Local failure of a single feature group
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("recording too short: {duration:.2}s (needs {required:.2}s)")]
    InsufficientDuration { duration: f64, required: f64 },

    #[error("signal is silent")]
    Silent,

    #[error("no stable periodicity (strength {strength:.3}, needs {required:.3})")]
    Aperiodic { strength: f32, required: f32 },

    #[error("degenerate input: {reason}")]
    Degenerate { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using AnalyzerError
pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl AnalyzerError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether the request itself was bad, as opposed to an environment failure
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Audio(AudioError::DurationExceeded { duration, limit }) => {
                format!("Audio too long: {:.1}s (max {:.0}s)", duration, limit)
            }
            Self::Audio(AudioError::UnsupportedFormat { format }) => {
                format!(
                    "Invalid file type '{}'. Please upload WAV, MP3, FLAC, or M4A files.",
                    format
                )
            }
            Self::Audio(AudioError::FileTooLarge { limit, .. }) => {
                format!("File too large (max {}MB)", limit / (1024 * 1024))
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

impl TransformError {
    pub(crate) fn degenerate<S: Into<String>>(reason: S) -> Self {
        Self::Degenerate { reason: reason.into() }
    }
}
