use std::f32::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::filters::hann_symmetric;
use crate::dsp::scale::{amplitude_to_db, DbReference};
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft, REFERENCE_SAMPLE_RATE};
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::{invalid, require_samples};

/// Constant-Q transform parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CqtParams {
    /// Centre frequency of the lowest bin (C2)
    pub fmin: f32,
    pub n_bins: usize,
    pub bins_per_octave: usize,
    pub hop_length: usize,
    /// Share of each kernel's magnitude mass that may be discarded
    pub sparsity: f32,
    pub top_db: f32,
}

impl Default for CqtParams {
    fn default() -> Self {
        Self {
            fmin: 65.41,
            n_bins: 84,
            bins_per_octave: 12,
            hop_length: 512,
            sparsity: 0.01,
            top_db: 80.0,
        }
    }
}

impl CqtParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fmin > 0.0) {
            return Err(invalid("transforms.cqt.fmin", self.fmin));
        }
        if self.n_bins == 0 {
            return Err(invalid("transforms.cqt.n_bins", self.n_bins));
        }
        if self.bins_per_octave == 0 {
            return Err(invalid("transforms.cqt.bins_per_octave", self.bins_per_octave));
        }
        if self.hop_length == 0 {
            return Err(invalid("transforms.cqt.hop_length", self.hop_length));
        }
        if !(0.0..1.0).contains(&self.sparsity) {
            return Err(invalid("transforms.cqt.sparsity", self.sparsity));
        }
        if !(self.top_db > 0.0) {
            return Err(invalid("transforms.cqt.top_db", self.top_db));
        }
        Ok(())
    }

    /// Quality factor shared by every bin
    pub fn q_factor(&self) -> f32 {
        1.0 / (2f32.powf(1.0 / self.bins_per_octave as f32) - 1.0)
    }

    /// Centre frequencies strictly below Nyquist, ascending
    pub fn frequencies(&self, sample_rate: u32) -> Vec<f32> {
        let nyquist = sample_rate as f32 / 2.0;
        (0..self.n_bins)
            .map(|k| self.fmin * 2f32.powf(k as f32 / self.bins_per_octave as f32))
            .take_while(|&f| f < nyquist)
            .collect()
    }
}

/// Conjugated spectral kernel of one bin, stored sparsely
struct SpectralKernel {
    entries: Vec<(usize, Complex<f32>)>,
}

impl SpectralKernel {
    fn apply(&self, spectrum: &[Complex<f32>]) -> f32 {
        self.entries
            .iter()
            .map(|&(bin, weight)| spectrum[bin] * weight)
            .sum::<Complex<f32>>()
            .norm()
    }
}

/// Build one kernel per centre frequency, sized to a shared FFT length
fn spectral_kernels(
    frequencies: &[f32],
    q: f32,
    sample_rate: u32,
    sparsity: f32,
) -> (usize, Vec<SpectralKernel>) {
    let lengths: Vec<usize> = frequencies
        .iter()
        .map(|&f| (q * sample_rate as f32 / f).ceil().max(1.0) as usize)
        .collect();
    let fft_len = lengths.iter().copied().max().unwrap_or(1).next_power_of_two();
    let half = fft_len / 2;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);

    let kernels = frequencies
        .iter()
        .zip(&lengths)
        .map(|(&freq, &len)| {
            let window = hann_symmetric(len);
            let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_len];
            let start = (fft_len - len) / 2;
            for (j, &w) in window.iter().enumerate() {
                // Phase is measured from the kernel centre, which sits at the frame centre
                let t = (j as f32 - len as f32 / 2.0) / sample_rate as f32;
                let phase = 2.0 * PI * freq * t;
                buffer[start + j] = Complex::new(phase.cos(), phase.sin()) * (w / len as f32);
            }
            fft.process(&mut buffer);

            // Only non-negative frequencies meet the real-signal spectrum
            let mut entries: Vec<(usize, Complex<f32>)> = buffer[..=half]
                .iter()
                .enumerate()
                .map(|(bin, &value)| (bin, value.conj() / fft_len as f32))
                .collect();
            sparsify(&mut entries, sparsity);

            SpectralKernel { entries }
        })
        .collect();

    (fft_len, kernels)
}

/// Drop the smallest weights whose combined magnitude is at most `sparsity`
/// of the total
fn sparsify(entries: &mut Vec<(usize, Complex<f32>)>, sparsity: f32) {
    if sparsity <= 0.0 {
        return;
    }
    let mut magnitudes: Vec<f32> = entries.iter().map(|(_, w)| w.norm()).collect();
    magnitudes.sort_by(|a, b| a.total_cmp(b));
    let total: f32 = magnitudes.iter().sum();

    let budget = sparsity * total;
    let mut dropped = 0.0;
    let mut threshold = 0.0;
    for &m in &magnitudes {
        if dropped + m > budget {
            break;
        }
        dropped += m;
        threshold = m;
    }
    entries.retain(|(_, w)| w.norm() > threshold);
}

/// Log-amplitude constant-Q spectrogram, `bins x frames`
pub fn compute(buffer: &AudioBuffer, params: &CqtParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
    require_samples(buffer, 1)?;

    let sample_rate = buffer.sample_rate();
    let frequencies = params.frequencies(sample_rate);
    if frequencies.is_empty() {
        return Err(TransformError::degenerate(format!(
            "no CQT bins below Nyquist ({} Hz)",
            sample_rate / 2
        )));
    }

    let (fft_len, kernels) = spectral_kernels(&frequencies, params.q_factor(), sample_rate, params.sparsity);
    let hop = ((params.hop_length as f64 * sample_rate as f64 / REFERENCE_SAMPLE_RATE as f64).round() as usize).max(1);
    tracing::debug!(
        "CQT: {} bins, kernel FFT {}, hop {}",
        frequencies.len(),
        fft_len,
        hop
    );

    let stft = Stft::rectangular(FrameGeometry { n_fft: fft_len, hop });
    let frames = stft.geometry().frame_count(buffer.len(), Framing::Centered);
    let mut cqt = Matrix::zeros(kernels.len(), frames);

    stft.visit_frames(buffer.samples(), Framing::Centered, cancel, |frame, spectrum| {
        for (row, kernel) in kernels.iter().enumerate() {
            cqt.set(row, frame, kernel.apply(spectrum));
        }
    })?;

    amplitude_to_db(&mut cqt, DbReference::Max, Some(params.top_db));
    cqt.validated()
}
