use crate::audio::AudioBuffer;
use crate::dsp::stats::{excess_kurtosis, mean, skewness, std_dev};
use crate::dsp::{FrameGeometry, Framing};
use crate::error::FeatureError;
use crate::features::{mean_std, FeatureConfig, FeatureValue, GroupResult, GroupValues};

/// Sample at `index`, with out-of-range positions padded by `pad`
fn padded(samples: &[f32], index: isize, edge: bool) -> f32 {
    if index >= 0 && (index as usize) < samples.len() {
        samples[index as usize]
    } else if edge {
        let clamped = index.clamp(0, samples.len() as isize - 1);
        samples[clamped as usize]
    } else {
        0.0
    }
}

/// Centred frame RMS, zero-padded
pub(crate) fn frame_rms(samples: &[f32], geometry: FrameGeometry) -> Vec<f32> {
    let frames = geometry.frame_count(samples.len(), Framing::Centered);
    let half = (geometry.n_fft / 2) as isize;
    (0..frames)
        .map(|frame| {
            let start = (frame * geometry.hop) as isize - half;
            let energy: f32 = (0..geometry.n_fft as isize)
                .map(|i| {
                    let s = padded(samples, start + i, false);
                    s * s
                })
                .sum();
            (energy / geometry.n_fft as f32).sqrt()
        })
        .collect()
}

/// Centred frame zero-crossing rate, edge-padded.
///
/// A crossing is a change of sign where zero counts as positive.
pub(crate) fn frame_zcr(samples: &[f32], geometry: FrameGeometry) -> Vec<f32> {
    let frames = geometry.frame_count(samples.len(), Framing::Centered);
    let half = (geometry.n_fft / 2) as isize;
    (0..frames)
        .map(|frame| {
            let start = (frame * geometry.hop) as isize - half;
            let crossings = (1..geometry.n_fft as isize)
                .filter(|&i| {
                    let a = padded(samples, start + i - 1, true);
                    let b = padded(samples, start + i, true);
                    (a >= 0.0) != (b >= 0.0)
                })
                .count();
            crossings as f32 / geometry.n_fft as f32
        })
        .collect()
}

/// Energy, zero-crossing and amplitude statistics
pub fn extract(buffer: &AudioBuffer, config: &FeatureConfig) -> GroupResult {
    let samples = buffer.samples();
    if samples.is_empty() {
        return Err(FeatureError::Degenerate {
            reason: "no samples".to_string(),
        });
    }

    let geometry = FrameGeometry::scaled(config.n_fft, config.hop_length, buffer.sample_rate());
    let rms = frame_rms(samples, geometry);
    let zcr = frame_zcr(samples, geometry);

    let (rms_mean, rms_std) = mean_std(&rms);
    let (zcr_mean, zcr_std) = mean_std(&zcr);

    let peak = buffer.peak() as f64;
    let crest = match rms_mean.as_f64() {
        Some(r) if r > 0.0 => FeatureValue::from(peak / r),
        _ => FeatureValue::Undefined,
    };

    let magnitudes: Vec<f32> = samples.iter().map(|s| s.abs()).collect();
    let min_magnitude = magnitudes.iter().copied().fold(f32::INFINITY, f32::min) as f64;

    Ok(GroupValues::new(vec![
        ("rms_energy_mean".to_string(), rms_mean),
        ("rms_energy_std".to_string(), rms_std),
        ("zero_crossing_rate_mean".to_string(), zcr_mean),
        ("zero_crossing_rate_std".to_string(), zcr_std),
        ("peak_amplitude".to_string(), peak.into()),
        ("crest_factor".to_string(), crest),
        ("mean_amplitude".to_string(), mean(&magnitudes).into()),
        ("std_amplitude".to_string(), std_dev(samples).into()),
        ("skewness_amplitude".to_string(), skewness(samples).into()),
        ("kurtosis_amplitude".to_string(), excess_kurtosis(samples).into()),
        ("dynamic_range".to_string(), (peak - min_magnitude).into()),
    ]))
}
