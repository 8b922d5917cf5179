use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Decoded mono audio ready for analysis.
///
/// Samples are private so the buffer cannot be mutated once the loader hands
/// it out; every transform and feature group borrows it read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap already-decoded mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::Decode {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(AudioError::Decode {
                reason: "decoded samples contain non-finite values".to_string(),
            });
        }

        Ok(Self { samples, sample_rate })
    }

    /// Mono samples in [-1, 1]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Highest absolute amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }
}

/// Container formats accepted by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    M4a,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [Self::Wav, Self::Mp3, Self::Flac, Self::M4a];

    /// Canonical lowercase extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::M4a => "m4a",
        }
    }

    /// Detect the format from a file name, ignoring case
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        extension.parse()
    }

    /// Check if a file extension is supported
    pub fn is_supported(extension: &str) -> bool {
        extension.parse::<Self>().is_ok()
    }
}

impl FromStr for AudioFormat {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim_start_matches('.').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == lowered)
            .ok_or(AudioError::UnsupportedFormat { format: lowered })
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
