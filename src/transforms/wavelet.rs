use std::f32::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::Matrix;
use crate::error::{ConfigError, TransformError};
use crate::pipeline::CancelToken;
use crate::transforms::invalid;

/// Complex Morlet scalogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveletParams {
    pub n_scales: usize,
    /// Smallest scale is `10^min_scale_exp` samples
    pub min_scale_exp: f32,
    pub max_scale_exp: f32,
    /// Morlet bandwidth parameter
    pub bandwidth: f32,
    /// Morlet centre frequency (cycles per unit scale)
    pub center_frequency: f32,
    /// Longer input is decimated down to about this many samples
    pub max_samples: usize,
    /// Decimated samples per output column
    pub pool_size: usize,
    pub min_samples: usize,
}

impl Default for WaveletParams {
    fn default() -> Self {
        Self {
            n_scales: 50,
            min_scale_exp: 0.5,
            max_scale_exp: 3.5,
            bandwidth: 1.5,
            center_frequency: 1.0,
            max_samples: 20_000,
            pool_size: 32,
            min_samples: 256,
        }
    }
}

impl WaveletParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_scales < 2 {
            return Err(invalid("transforms.wavelet.n_scales", self.n_scales));
        }
        if !(self.min_scale_exp >= 0.0 && self.min_scale_exp < self.max_scale_exp) {
            return Err(invalid(
                "transforms.wavelet.scale_range",
                format!("{}-{}", self.min_scale_exp, self.max_scale_exp),
            ));
        }
        if !(self.bandwidth > 0.0) {
            return Err(invalid("transforms.wavelet.bandwidth", self.bandwidth));
        }
        if !(self.center_frequency > 0.0) {
            return Err(invalid("transforms.wavelet.center_frequency", self.center_frequency));
        }
        if self.max_samples == 0 {
            return Err(invalid("transforms.wavelet.max_samples", self.max_samples));
        }
        if self.pool_size == 0 {
            return Err(invalid("transforms.wavelet.pool_size", self.pool_size));
        }
        Ok(())
    }

    /// Scales in samples, largest first so rows come out in ascending frequency
    pub fn scales(&self) -> Vec<f32> {
        let step = (self.max_scale_exp - self.min_scale_exp) / (self.n_scales - 1) as f32;
        (0..self.n_scales)
            .rev()
            .map(|i| 10f32.powf(self.min_scale_exp + step * i as f32))
            .collect()
    }
}

/// Integer decimation factor that brings `len` down to about `max_samples`
pub fn decimation_factor(len: usize, max_samples: usize) -> usize {
    if len > max_samples {
        (len / max_samples).max(1)
    } else {
        1
    }
}

/// Block-average decimation; the trailing partial block is averaged on its own
fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(factor)
        .map(|block| block.iter().sum::<f32>() / block.len() as f32)
        .collect()
}

/// Continuous wavelet transform power in dB, max-pooled over time
pub fn compute(buffer: &AudioBuffer, params: &WaveletParams, cancel: &CancelToken) -> Result<Matrix, TransformError> {
    let factor = decimation_factor(buffer.len(), params.max_samples);
    let signal = decimate(buffer.samples(), factor);

    let required = params.min_samples.max(params.n_scales);
    if signal.len() < required {
        return Err(TransformError::InsufficientSamples {
            available: signal.len(),
            required,
        });
    }

    let effective_rate = buffer.sample_rate() as f32 / factor as f32;
    tracing::debug!(
        "Wavelet: {} samples decimated by {} to {} at {:.1} Hz",
        buffer.len(),
        factor,
        signal.len(),
        effective_rate
    );

    let n = signal.len();
    let padded = n.next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(padded);
    let inverse = planner.plan_fft_inverse(padded);

    let mut spectrum: Vec<Complex<f32>> = signal
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(padded)
        .collect();
    forward.process(&mut spectrum);

    let scales = params.scales();
    let columns = (n + params.pool_size - 1) / params.pool_size;
    let mut output = Matrix::zeros(scales.len(), columns);
    let mut coefficients = vec![Complex::new(0.0f32, 0.0); padded];

    for (row, &scale) in scales.iter().enumerate() {
        cancel.check()?;

        // Analytic Morlet: the response is zero for negative frequencies
        let amplitude = scale.sqrt() / padded as f32;
        for (k, slot) in coefficients.iter_mut().enumerate() {
            *slot = if k <= padded / 2 {
                let freq = k as f32 / padded as f32;
                let offset = scale * freq - params.center_frequency;
                let response = (-PI * PI * params.bandwidth * offset * offset).exp();
                spectrum[k] * (response * amplitude)
            } else {
                Complex::new(0.0, 0.0)
            };
        }
        inverse.process(&mut coefficients);

        let power_db: Vec<f32> = coefficients[..n]
            .iter()
            .map(|c| 10.0 * (c.norm_sqr() + f32::EPSILON).log10())
            .collect();
        for (col, block) in power_db.chunks(params.pool_size).enumerate() {
            let peak = block.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            output.set(row, col, peak);
        }
    }

    output.validated()
}
