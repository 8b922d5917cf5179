use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::filters::mel_filterbank;
use crate::dsp::scale::{power_to_db, DbReference};
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft};
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::{invalid, require_samples};

/// Mel-spectrogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    /// Lowest filter edge (Hz)
    pub fmin: f32,
    /// Highest filter edge (Hz), clamped to Nyquist
    pub fmax: f32,
    pub top_db: f32,
}

impl Default for MelParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            fmin: 50.0,
            fmax: 8000.0,
            top_db: 80.0,
        }
    }
}

impl MelParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_fft < 16 || !self.n_fft.is_power_of_two() {
            return Err(invalid("transforms.mel.n_fft", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("transforms.mel.hop_length", self.hop_length));
        }
        if self.n_mels == 0 {
            return Err(invalid("transforms.mel.n_mels", self.n_mels));
        }
        if !(self.fmin >= 0.0 && self.fmin < self.fmax) {
            return Err(invalid("transforms.mel.frequency_range", format!("{}-{}", self.fmin, self.fmax)));
        }
        if !(self.top_db > 0.0) {
            return Err(invalid("transforms.mel.top_db", self.top_db));
        }
        Ok(())
    }
}

/// Mel-band power per frame, `n_mels x frames`, before any dB conversion
pub(crate) fn mel_power(
    samples: &[f32],
    sample_rate: u32,
    geometry: FrameGeometry,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
    cancel: &CancelToken,
) -> Result<Matrix, TransformError> {
    let spectrum = Stft::new(geometry).magnitudes(samples, Framing::Centered, cancel)?;
    let bank = mel_filterbank(sample_rate, geometry.n_fft, n_mels, fmin, fmax);

    // Each triangle covers a narrow run of bins; skip the zeros
    let support: Vec<(usize, usize)> = bank
        .iter()
        .map(|weights| {
            let start = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
            let end = weights.iter().rposition(|&w| w > 0.0).map_or(0, |i| i + 1);
            (start, end.max(start))
        })
        .collect();

    let frames = spectrum.cols();
    let mut mel = Matrix::zeros(n_mels, frames);
    for frame in 0..frames {
        cancel.check()?;
        for (band, weights) in bank.iter().enumerate() {
            let (start, end) = support[band];
            let energy: f32 = (start..end)
                .map(|bin| {
                    let magnitude = spectrum.get(bin, frame);
                    weights[bin] * magnitude * magnitude
                })
                .sum();
            mel.set(band, frame, energy);
        }
    }

    Ok(mel)
}

/// Log-power mel spectrogram referenced to its loudest cell
pub fn compute(buffer: &AudioBuffer, params: &MelParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
    require_samples(buffer, 1)?;

    let sample_rate = buffer.sample_rate();
    let fmax = params.fmax.min(sample_rate as f32 / 2.0);
    if params.fmin >= fmax {
        return Err(TransformError::degenerate(format!(
            "mel range {}-{} Hz is empty at {} Hz",
            params.fmin, fmax, sample_rate
        )));
    }

    let geometry = FrameGeometry::scaled(params.n_fft, params.hop_length, sample_rate);
    let mut mel = mel_power(
        buffer.samples(),
        sample_rate,
        geometry,
        params.n_mels,
        params.fmin,
        fmax,
        cancel,
    )?;

    power_to_db(&mut mel, DbReference::Max, Some(params.top_db));
    mel.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::tests::sine_buffer;

    #[test]
    fn test_shape() {
        let buffer = sine_buffer(440.0, 22050, 22050);
        let mel = compute(&buffer, &MelParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(mel.rows(), 128);
        assert_eq!(mel.cols(), 44);
    }

    #[test]
    fn test_db_range() {
        let buffer = sine_buffer(1000.0, 22050, 22050);
        let mel = compute(&buffer, &MelParams::default(), &CancelToken::new()).unwrap();
        let (lo, hi) = mel.min_max();
        assert!(hi.abs() < 1e-4);
        assert!(lo >= -80.0 - 1e-4);
    }

    #[test]
    fn test_sine_energy_lands_in_matching_band() {
        let buffer = sine_buffer(1000.0, 22050, 22050);
        let params = MelParams::default();
        let mel = compute(&buffer, &params, &CancelToken::new()).unwrap();

        let mid = mel.cols() / 2;
        let loudest = mel
            .column(mid)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(band, _)| band)
            .unwrap();

        let bank = mel_filterbank(22050, 2048, 128, params.fmin, params.fmax);
        let bin = (1000.0f32 / (22050.0 / 2048.0)).round() as usize;
        assert!((bin - 1..=bin + 1).any(|b| bank[loudest][b] > 0.0));
    }

    #[test]
    fn test_silence_gives_flat_matrix() {
        let buffer = AudioBuffer::new(vec![0.0; 4096], 22050).unwrap();
        let mel = compute(&buffer, &MelParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(mel.min_max(), (0.0, 0.0));
    }

    #[test]
    fn test_fmin_above_nyquist_is_degenerate() {
        let buffer = AudioBuffer::new(vec![0.1; 4096], 2000).unwrap();
        let params = MelParams {
            fmin: 1500.0,
            ..MelParams::default()
        };
        assert!(matches!(
            compute(&buffer, &params, &CancelToken::new()),
            Err(TransformError::Degenerate { .. })
        ));
    }
}
