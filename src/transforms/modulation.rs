use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::filters::{gaussian_smooth, hann_symmetric};
use crate::dsp::scale::{amplitude_to_db, DbReference};
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft};
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::{invalid, require_samples};

/// Modulation spectrogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulationParams {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Highest acoustic frequency row kept (Hz), clamped to Nyquist
    pub fmax: f32,
    /// Temporal smoothing in frames
    pub smoothing_sigma: f32,
    /// Highest modulation frequency kept (Hz)
    pub max_modulation_hz: f32,
    pub min_frames: usize,
    pub top_db: f32,
}

impl Default for ModulationParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            fmax: 8000.0,
            smoothing_sigma: 1.0,
            max_modulation_hz: 50.0,
            min_frames: 2,
            top_db: 80.0,
        }
    }
}

impl ModulationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_fft < 16 || !self.n_fft.is_power_of_two() {
            return Err(invalid("transforms.modulation.n_fft", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("transforms.modulation.hop_length", self.hop_length));
        }
        if !(self.fmax > 0.0) {
            return Err(invalid("transforms.modulation.fmax", self.fmax));
        }
        if !(self.smoothing_sigma >= 0.0) {
            return Err(invalid("transforms.modulation.smoothing_sigma", self.smoothing_sigma));
        }
        if !(self.max_modulation_hz > 0.0) {
            return Err(invalid("transforms.modulation.max_modulation_hz", self.max_modulation_hz));
        }
        if self.min_frames < 2 {
            return Err(invalid("transforms.modulation.min_frames", self.min_frames));
        }
        if !(self.top_db > 0.0) {
            return Err(invalid("transforms.modulation.top_db", self.top_db));
        }
        Ok(())
    }
}

/// Modulation bins kept: the lower half of the envelope spectrum, up to the
/// modulation ceiling, never fewer than one
pub fn modulation_bins(frames: usize, frame_rate: f32, max_modulation_hz: f32) -> usize {
    let half = frames / 2;
    let resolution = frame_rate / frames as f32;
    (0..half)
        .take_while(|&j| j as f32 * resolution <= max_modulation_hz)
        .count()
        .max(1)
}

/// Envelope spectrum of every acoustic band, `bands x modulation bins`
pub fn compute(buffer: &AudioBuffer, params: &ModulationParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
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

    let total_energy: f64 = magnitude.data().iter().map(|&m| (m as f64) * (m as f64)).sum();
    if total_energy <= 0.0 {
        return Err(TransformError::degenerate("signal has no spectral energy"));
    }

    let frame_rate = sample_rate as f32 / geometry.hop as f32;
    let kept = modulation_bins(frames, frame_rate, params.max_modulation_hz);
    let window = hann_symmetric(frames);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(frames);

    let mut output = Matrix::zeros(magnitude.rows(), kept);
    let mut envelope = vec![Complex::new(0.0f32, 0.0); frames];

    for band in 0..magnitude.rows() {
        cancel.check()?;

        let smoothed = gaussian_smooth(magnitude.row(band), params.smoothing_sigma);
        let mean = smoothed.iter().sum::<f32>() / frames as f32;
        for ((slot, &value), &w) in envelope.iter_mut().zip(&smoothed).zip(&window) {
            *slot = Complex::new((value - mean) * w, 0.0);
        }
        fft.process(&mut envelope);

        for (bin, value) in envelope[..kept].iter().enumerate() {
            output.set(band, bin, value.norm());
        }
    }

    amplitude_to_db(&mut output, DbReference::Max, Some(params.top_db));
    output.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::tests::sine_buffer;
    use std::f32::consts::PI;

    #[test]
    fn test_modulation_bins() {
        // 431 frames at 43.07 frames/s: 0.1 Hz resolution, capped at 50 Hz
        assert_eq!(modulation_bins(431, 22050.0 / 512.0, 50.0), 215);
        assert_eq!(modulation_bins(2, 43.07, 50.0), 1);
        assert_eq!(modulation_bins(100, 43.07, 5.0), 12);
    }

    #[test]
    fn test_shape() {
        let buffer = sine_buffer(1000.0, 22050, 22050);
        let spec = compute(&buffer, &ModulationParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(spec.rows(), 744);
        assert_eq!(spec.cols(), 22);
    }

    #[test]
    fn test_silence_is_degenerate() {
        let buffer = AudioBuffer::new(vec![0.0; 22050], 22050).unwrap();
        assert!(matches!(
            compute(&buffer, &ModulationParams::default(), &CancelToken::new()),
            Err(TransformError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_amplitude_modulation_shows_up() {
        let sample_rate = 22050;
        let carrier = 2000.0;
        let rate = 8.0;
        let samples: Vec<f32> = (0..sample_rate * 4)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (1.0 + 0.8 * (2.0 * PI * rate * t).sin()) * (2.0 * PI * carrier * t).sin() * 0.5
            })
            .collect();
        let buffer = AudioBuffer::new(samples, sample_rate as u32).unwrap();
        let spec = compute(&buffer, &ModulationParams::default(), &CancelToken::new()).unwrap();

        let band = (carrier / (22050.0 / 2048.0)).round() as usize;
        let frames = 1 + 88200 / 512;
        let resolution = (22050.0 / 512.0) / frames as f32;
        let row = spec.row(band);
        let loudest = row
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        assert!((loudest as f32 * resolution - rate).abs() < 2.0 * resolution);
    }
}
