use crate::audio::AudioBuffer;
use crate::dsp::stats::std_dev;
use crate::dsp::{FrameGeometry, Framing, Stft};
use crate::error::FeatureError;
use crate::features::{FeatureConfig, FeatureValue, GroupResult, GroupValues};
use crate::pipeline::CancelToken;

const FLATNESS_AMIN: f64 = 1e-10;

/// Bins further than this below the spectrum's peak are window leakage
/// and carry no weight in the shape moments
const LEAKAGE_FLOOR_DB: f64 = -60.0;

/// Magnitudes with everything under the leakage floor zeroed
fn above_leakage_floor(magnitudes: &[f32]) -> Vec<f64> {
    let peak = magnitudes.iter().fold(0.0f32, |acc, &m| acc.max(m)) as f64;
    let floor = peak * 10f64.powf(LEAKAGE_FLOOR_DB / 20.0);
    magnitudes
        .iter()
        .map(|&m| if m as f64 >= floor { m as f64 } else { 0.0 })
        .collect()
}

/// Shape descriptors of a single magnitude spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpectralShape {
    centroid: f64,
    bandwidth: f64,
    rolloff: f64,
}

impl SpectralShape {
    /// `None` when the spectrum carries no energy
    fn of(magnitudes: &[f32], freqs: &[f64], rolloff_percent: f64) -> Option<Self> {
        let weights = above_leakage_floor(magnitudes);
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let centroid = weights.iter().zip(freqs).map(|(&m, &f)| m * f).sum::<f64>() / total;

        let bandwidth = (weights
            .iter()
            .zip(freqs)
            .map(|(&m, &f)| m * (f - centroid).powi(2))
            .sum::<f64>()
            / total)
            .sqrt();

        Some(Self {
            centroid,
            bandwidth,
            rolloff: rolloff(&weights, freqs, total * rolloff_percent),
        })
    }
}

/// Frequency below which `target` magnitude accumulates, interpolated
/// linearly inside the bin where the running sum crosses it
fn rolloff(magnitudes: &[f64], freqs: &[f64], target: f64) -> f64 {
    let mut cumulative = 0.0;
    for (bin, &m) in magnitudes.iter().enumerate() {
        if cumulative + m >= target {
            if bin == 0 || m <= 0.0 {
                return freqs[bin];
            }
            let step = freqs[bin] - freqs[bin - 1];
            return freqs[bin - 1] + step * (target - cumulative) / m;
        }
        cumulative += m;
    }
    freqs.last().copied().unwrap_or(0.0)
}

/// Geometric over arithmetic mean of the power spectrum
fn flatness(power: &[f64]) -> f64 {
    let floored: Vec<f64> = power.iter().map(|&p| p.max(FLATNESS_AMIN)).collect();
    let log_mean = floored.iter().map(|p| p.ln()).sum::<f64>() / floored.len() as f64;
    let arithmetic = floored.iter().sum::<f64>() / floored.len() as f64;
    log_mean.exp() / arithmetic
}

/// Spectral shape of the clip-average spectrum plus its per-frame spread
pub fn extract(buffer: &AudioBuffer, config: &FeatureConfig) -> GroupResult {
    if buffer.is_empty() {
        return Err(FeatureError::Degenerate {
            reason: "no samples".to_string(),
        });
    }

    let sample_rate = buffer.sample_rate();
    let geometry = FrameGeometry::scaled(config.n_fft, config.hop_length, sample_rate);
    let spectrum = Stft::new(geometry)
        .magnitudes(buffer.samples(), Framing::Full, &CancelToken::new())
        .map_err(|e| FeatureError::Degenerate { reason: e.to_string() })?;

    let freqs: Vec<f64> = (0..geometry.bins())
        .map(|bin| geometry.bin_frequency(bin, sample_rate) as f64)
        .collect();
    let frames = spectrum.cols();

    let average: Vec<f32> = (0..spectrum.rows())
        .map(|bin| spectrum.row(bin).iter().sum::<f32>() / frames as f32)
        .collect();
    let rolloff_percent = config.rolloff_percent as f64;

    let shape = SpectralShape::of(&average, &freqs, rolloff_percent).ok_or(FeatureError::Silent)?;

    let average_power: Vec<f64> = (0..spectrum.rows())
        .map(|bin| spectrum.row(bin).iter().map(|&m| (m as f64).powi(2)).sum::<f64>() / frames as f64)
        .collect();

    let mut per_frame = Vec::with_capacity(frames);
    let mut frame_flatness = Vec::with_capacity(frames);
    for frame in 0..frames {
        let column = spectrum.column(frame);
        if let Some(shape) = SpectralShape::of(&column, &freqs, rolloff_percent) {
            per_frame.push(shape);
            let power: Vec<f64> = column.iter().map(|&m| (m as f64).powi(2)).collect();
            frame_flatness.push(flatness(&power) as f32);
        }
    }
    let spread = |select: fn(&SpectralShape) -> f64| -> FeatureValue {
        let values: Vec<f32> = per_frame.iter().map(|s| select(s) as f32).collect();
        std_dev(&values).into()
    };

    Ok(GroupValues::new(vec![
        ("spectral_centroid".to_string(), shape.centroid.into()),
        ("spectral_bandwidth".to_string(), shape.bandwidth.into()),
        ("spectral_rolloff".to_string(), shape.rolloff.into()),
        ("spectral_flatness".to_string(), flatness(&average_power).into()),
        ("spectral_centroid_std".to_string(), spread(|s| s.centroid)),
        ("spectral_bandwidth_std".to_string(), spread(|s| s.bandwidth)),
        ("spectral_rolloff_std".to_string(), spread(|s| s.rolloff)),
        ("spectral_flatness_std".to_string(), std_dev(&frame_flatness).into()),
    ]))
}
