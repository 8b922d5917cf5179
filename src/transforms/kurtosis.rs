use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::stats::excess_kurtosis;
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft};
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::{invalid, require_samples};

/// Spectral kurtosis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KurtosisParams {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Highest frequency row kept (Hz), clamped to Nyquist
    pub fmax: f32,
    /// Frames in the sliding window, clamped to the clip's frame count
    pub window_count: usize,
    pub min_frames: usize,
}

impl Default for KurtosisParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            fmax: 8000.0,
            window_count: 16,
            min_frames: 4,
        }
    }
}

impl KurtosisParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_fft < 16 || !self.n_fft.is_power_of_two() {
            return Err(invalid("transforms.kurtosis.n_fft", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("transforms.kurtosis.hop_length", self.hop_length));
        }
        if !(self.fmax > 0.0) {
            return Err(invalid("transforms.kurtosis.fmax", self.fmax));
        }
        // Kurtosis of fewer than four values says nothing
        if self.min_frames < 4 {
            return Err(invalid("transforms.kurtosis.min_frames", self.min_frames));
        }
        if self.window_count < self.min_frames {
            return Err(invalid("transforms.kurtosis.window_count", self.window_count));
        }
        Ok(())
    }
}

/// Start of the centred window of `width` frames around `frame`
fn window_start(frame: usize, width: usize, frames: usize) -> usize {
    frame.saturating_sub(width / 2).min(frames - width)
}

/// Excess kurtosis of each bin's magnitude over a sliding window of frames
pub fn compute(buffer: &AudioBuffer, params: &KurtosisParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
    require_samples(buffer, 1)?;

    let sample_rate = buffer.sample_rate();
    let geometry = FrameGeometry::scaled(params.n_fft, params.hop_length, sample_rate);
    let frames = geometry.frame_count(buffer.len(), Framing::Centered);
    if frames < params.min_frames {
        return Err(TransformError::InsufficientFrames {
            available: frames,
            required: params.min_frames,
        });
    }

    let mut magnitude = Stft::new(geometry).magnitudes(buffer.samples(), Framing::Centered, cancel)?;
    magnitude.truncate_rows(geometry.bins_up_to(params.fmax, sample_rate));

    let width = params.window_count.min(frames);
    let rows = magnitude.rows();
    let mut output = Matrix::zeros(rows, frames);
    let mut varying_bins = 0;

    for row in 0..rows {
        cancel.check()?;
        let series = magnitude.row(row);
        if excess_kurtosis(series).is_some() {
            varying_bins += 1;
        }
        for frame in 0..frames {
            let start = window_start(frame, width, frames);
            let value = excess_kurtosis(&series[start..start + width]).unwrap_or(0.0);
            output.set(row, frame, value as f32);
        }
    }

    if varying_bins == 0 {
        return Err(TransformError::degenerate(
            "every frequency bin has zero variance over time",
        ));
    }

    output.validated()
}
