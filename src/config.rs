use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    features::FeatureConfig,
    transforms::TransformConfig,
};

/// Main configuration for the analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decoding and duration contract
    pub audio: AudioConfig,

    /// Per-transform parameters, given at the 22 050 Hz reference rate
    pub transforms: TransformConfig,

    /// Feature extraction thresholds
    pub features: FeatureConfig,

    /// Image output settings
    pub render: RenderConfig,

    /// Worker pool and cancellation
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.transforms.validate()?;
        self.features.validate()?;
        self.render.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// Audio decoding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Analysis sample rate (Hz); every source is resampled to it
    pub sample_rate: u32,

    /// Duration ceiling in seconds
    pub max_duration_secs: f64,

    /// Scale the peak amplitude to 1.0 after decoding
    pub normalize: bool,

    /// Largest accepted encoded file
    pub max_file_bytes: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            max_duration_secs: 20.0,
            normalize: true,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

impl AudioConfig {
    /// Most samples a recording at `sample_rate` may have; a recording
    /// exactly at the ceiling is accepted
    pub fn max_samples(&self, sample_rate: u32) -> usize {
        (self.max_duration_secs * sample_rate as f64).round() as usize
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate < 1000 {
            return Err(ConfigError::InvalidValue {
                key: "audio.sample_rate".to_string(),
                value: self.sample_rate.to_string()
            }.into());
        }

        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "audio.max_duration_secs".to_string(),
                value: self.max_duration_secs.to_string()
            }.into());
        }

        if self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "audio.max_file_bytes".to_string(),
                value: self.max_file_bytes.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Image output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Percentile clip range used for spectral kurtosis
    pub kurtosis_percentiles: (f32, f32),
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            kurtosis_percentiles: (5.0, 95.0),
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width > 8192 || self.height > 8192 {
            return Err(ConfigError::InvalidValue {
                key: "render.size".to_string(),
                value: format!("{}x{}", self.width, self.height)
            }.into());
        }

        let (low, high) = self.kurtosis_percentiles;
        if !(0.0..100.0).contains(&low) || !(low < high && high <= 100.0) {
            return Err(ConfigError::InvalidValue {
                key: "render.kurtosis_percentiles".to_string(),
                value: format!("{}-{}", low, high)
            }.into());
        }

        Ok(())
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Threads in the analysis pool
    pub worker_threads: usize,

    /// Per-request deadline in milliseconds, none by default
    pub deadline_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            deadline_ms: None,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.worker_threads".to_string(),
                value: self.worker_threads.to_string()
            }.into());
        }

        if self.deadline_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.deadline_ms".to_string(),
                value: "0".to_string()
            }.into());
        }

        Ok(())
    }
}
