use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::dsp::filters::hann_periodic;
use crate::dsp::matrix::Matrix;
use crate::error::TransformError;
use crate::pipeline::CancelToken;

/// Rate at which every window and hop size in the configuration is expressed
pub const REFERENCE_SAMPLE_RATE: u32 = 22050;

/// FFT size and hop length at the buffer's actual sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub n_fft: usize,
    pub hop: usize,
}

impl FrameGeometry {
    /// Scale reference-rate sizes to `sample_rate`.
    ///
    /// The FFT size snaps to the nearest power of two of `n_fft * sr / 22050`
    /// and the hop keeps the configured window/hop ratio.
    pub fn scaled(n_fft: usize, hop: usize, sample_rate: u32) -> Self {
        let ratio = sample_rate as f64 / REFERENCE_SAMPLE_RATE as f64;
        let target = (n_fft.max(2) as f64 * ratio).max(2.0);
        let scaled_fft = 1usize << target.log2().round().max(1.0) as u32;
        let scaled_hop = (hop.max(1) as f64 * scaled_fft as f64 / n_fft.max(2) as f64)
            .round()
            .max(1.0) as usize;

        Self {
            n_fft: scaled_fft,
            hop: scaled_hop,
        }
    }

    /// Number of non-negative frequency bins
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.n_fft as f32
    }

    /// Number of bins whose frequency does not exceed `max_hz`
    pub fn bins_up_to(&self, max_hz: f32, sample_rate: u32) -> usize {
        let nyquist = sample_rate as f32 / 2.0;
        let limit = max_hz.min(nyquist);
        (0..self.bins())
            .take_while(|&bin| self.bin_frequency(bin, sample_rate) <= limit)
            .count()
    }

    pub fn frame_count(&self, len: usize, framing: Framing) -> usize {
        match framing {
            Framing::Centered => 1 + len / self.hop,
            Framing::Full if len <= self.n_fft => 1,
            Framing::Full => 1 + (len - self.n_fft) / self.hop,
        }
    }
}

/// How frames are laid over the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Frame `t` is centred on sample `t * hop`, zero-padded at both ends
    Centered,
    /// Frame `t` starts at sample `t * hop`; only whole frames (at least one)
    Full,
}

/// Short-time Fourier transform with a periodic Hann window
pub struct Stft {
    geometry: FrameGeometry,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl Stft {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self::with_window(geometry, hann_periodic(geometry.n_fft))
    }

    /// Frames are taken as-is, for kernels that carry their own window
    pub fn rectangular(geometry: FrameGeometry) -> Self {
        Self::with_window(geometry, vec![1.0; geometry.n_fft])
    }

    fn with_window(geometry: FrameGeometry, window: Vec<f32>) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(geometry.n_fft);

        Self { geometry, window, fft }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Magnitude spectrogram, `bins x frames`
    pub fn magnitudes(
        &self,
        samples: &[f32],
        framing: Framing,
        cancel: &CancelToken,
    ) -> Result<Matrix, TransformError> {
        let frames = self.geometry.frame_count(samples.len(), framing);
        let mut output = Matrix::zeros(self.geometry.bins(), frames);

        self.visit_frames(samples, framing, cancel, |frame, spectrum| {
            for (bin, value) in spectrum.iter().enumerate() {
                output.set(bin, frame, value.norm());
            }
        })?;

        Ok(output)
    }

    /// Hand each frame's non-negative-frequency spectrum to `visit`.
    ///
    /// The cancel token is checked before every frame.
    pub fn visit_frames<F>(
        &self,
        samples: &[f32],
        framing: Framing,
        cancel: &CancelToken,
        mut visit: F,
    ) -> Result<(), TransformError>
    where
        F: FnMut(usize, &[Complex<f32>]),
    {
        let n_fft = self.geometry.n_fft;
        let hop = self.geometry.hop;
        let frames = self.geometry.frame_count(samples.len(), framing);
        let offset = match framing {
            Framing::Centered => (n_fft / 2) as isize,
            Framing::Full => 0,
        };

        let mut input_buffer = self.fft.make_input_vec();
        let mut spectrum_buffer = self.fft.make_output_vec();

        for frame in 0..frames {
            cancel.check()?;

            let start = (frame * hop) as isize - offset;
            for (i, slot) in input_buffer.iter_mut().enumerate() {
                let index = start + i as isize;
                let sample = if index >= 0 && (index as usize) < samples.len() {
                    samples[index as usize]
                } else {
                    0.0
                };
                *slot = sample * self.window[i];
            }

            self.fft
                .process(&mut input_buffer, &mut spectrum_buffer)
                .map_err(|e| TransformError::Fft { reason: e.to_string() })?;

            visit(frame, &spectrum_buffer);
        }

        Ok(())
    }
}
