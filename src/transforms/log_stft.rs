use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::filters::interpolate;
use crate::dsp::scale::{amplitude_to_db, DbReference};
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft};
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::{invalid, require_samples};

/// Log-frequency STFT parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStftParams {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Output rows, geometrically spaced
    pub n_rows: usize,
    /// Frequency of the bottom row (Hz); the top row is Nyquist
    pub fmin: f32,
    pub top_db: f32,
}

impl Default for LogStftParams {
    fn default() -> Self {
        Self {
            n_fft: 4096,
            hop_length: 1024,
            n_rows: 256,
            fmin: 50.0,
            top_db: 80.0,
        }
    }
}

impl LogStftParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_fft < 16 || !self.n_fft.is_power_of_two() {
            return Err(invalid("transforms.log_stft.n_fft", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("transforms.log_stft.hop_length", self.hop_length));
        }
        if self.n_rows < 2 {
            return Err(invalid("transforms.log_stft.n_rows", self.n_rows));
        }
        if !(self.fmin > 0.0) {
            return Err(invalid("transforms.log_stft.fmin", self.fmin));
        }
        if !(self.top_db > 0.0) {
            return Err(invalid("transforms.log_stft.top_db", self.top_db));
        }
        Ok(())
    }
}

/// Geometric frequency grid from `fmin` to `fmax`, inclusive
pub fn log_frequencies(fmin: f32, fmax: f32, n: usize) -> Vec<f32> {
    let ratio = fmax / fmin;
    (0..n)
        .map(|i| fmin * ratio.powf(i as f32 / (n - 1).max(1) as f32))
        .collect()
}

/// dB magnitude STFT resampled onto a logarithmic frequency axis
pub fn compute(buffer: &AudioBuffer, params: &LogStftParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
    require_samples(buffer, 1)?;

    let sample_rate = buffer.sample_rate();
    let nyquist = sample_rate as f32 / 2.0;
    if params.fmin >= nyquist {
        return Err(TransformError::degenerate(format!(
            "log axis starts at {} Hz, above Nyquist {} Hz",
            params.fmin, nyquist
        )));
    }

    let geometry = FrameGeometry::scaled(params.n_fft, params.hop_length, sample_rate);
    let mut spectrum = Stft::new(geometry).magnitudes(buffer.samples(), Framing::Centered, cancel)?;
    amplitude_to_db(&mut spectrum, DbReference::Max, Some(params.top_db));

    let bin_freqs: Vec<f32> = (0..geometry.bins())
        .map(|bin| geometry.bin_frequency(bin, sample_rate))
        .collect();
    let targets = log_frequencies(params.fmin, nyquist, params.n_rows);

    let frames = spectrum.cols();
    let mut output = Matrix::zeros(params.n_rows, frames);
    for frame in 0..frames {
        cancel.check()?;
        let column = spectrum.column(frame);
        for (row, &freq) in targets.iter().enumerate() {
            output.set(row, frame, interpolate(&bin_freqs, &column, freq));
        }
    }

    output.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::tests::sine_buffer;

    #[test]
    fn test_log_grid_endpoints() {
        let grid = log_frequencies(50.0, 11025.0, 256);
        assert_eq!(grid.len(), 256);
        assert!((grid[0] - 50.0).abs() < 1e-3);
        assert!((grid[255] - 11025.0).abs() < 0.5);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_shape_and_range() {
        let buffer = sine_buffer(220.0, 22050, 22050);
        let spec = compute(&buffer, &LogStftParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(spec.rows(), 256);
        // 1 + 22050 / 1024
        assert_eq!(spec.cols(), 22);
        let (lo, hi) = spec.min_max();
        assert!(hi <= 1e-4);
        assert!(lo >= -80.0 - 1e-4);
    }

    #[test]
    fn test_low_tone_is_loudest_near_its_row() {
        let buffer = sine_buffer(220.0, 22050, 22050);
        let spec = compute(&buffer, &LogStftParams::default(), &CancelToken::new()).unwrap();
        let grid = log_frequencies(50.0, 11025.0, 256);

        let mid = spec.cols() / 2;
        let loudest = spec
            .column(mid)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(row, _)| row)
            .unwrap();
        assert!((grid[loudest] - 220.0).abs() < 6.0, "loudest row at {} Hz", grid[loudest]);
    }
}
