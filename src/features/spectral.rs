use std::f64::consts::PI;

use crate::audio::AudioBuffer;
use crate::dsp::scale::{power_db, power_to_db, DbReference};
use crate::dsp::{FrameGeometry, Framing, Matrix, Stft};
use crate::error::FeatureError;
use crate::features::{mean_std, FeatureConfig, FeatureValue, GroupResult, GroupValues};
use crate::pipeline::CancelToken;
use crate::transforms::mel::mel_power;

const N_MFCC: usize = 13;
const N_CHROMA: usize = 12;
const CONTRAST_BANDS: usize = 6;
const MFCC_TOP_DB: f32 = 80.0;

fn degenerate(error: impl ToString) -> FeatureError {
    FeatureError::Degenerate {
        reason: error.to_string(),
    }
}

/// Orthonormal DCT-II of one frame, first `n_out` coefficients
fn dct_ortho(input: &[f32], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x as f64 * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// `N_MFCC x frames` cepstral coefficients
fn mfcc(buffer: &AudioBuffer, geometry: FrameGeometry, n_mels: usize) -> Result<Vec<Vec<f32>>, FeatureError> {
    let sample_rate = buffer.sample_rate();
    let mut mel = mel_power(
        buffer.samples(),
        sample_rate,
        geometry,
        n_mels,
        0.0,
        sample_rate as f32 / 2.0,
        &CancelToken::new(),
    )
    .map_err(degenerate)?;
    power_to_db(&mut mel, DbReference::Value(1.0), Some(MFCC_TOP_DB));

    let mut coefficients = vec![Vec::with_capacity(mel.cols()); N_MFCC];
    for frame in 0..mel.cols() {
        for (k, c) in dct_ortho(&mel.column(frame), N_MFCC).into_iter().enumerate() {
            coefficients[k].push(c as f32);
        }
    }
    Ok(coefficients)
}

/// Pitch class of a frequency, C = 0
fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(N_CHROMA as i64) as usize
}

/// `12 x frames` chroma, each frame scaled so its strongest class is 1
fn chroma(power: &Matrix, geometry: FrameGeometry, sample_rate: u32) -> Vec<Vec<f32>> {
    let classes: Vec<Option<usize>> = (0..power.rows())
        .map(|bin| match geometry.bin_frequency(bin, sample_rate) {
            f if f > 0.0 => Some(pitch_class(f)),
            _ => None,
        })
        .collect();

    let mut chroma = vec![vec![0.0f32; power.cols()]; N_CHROMA];
    for frame in 0..power.cols() {
        for (bin, class) in classes.iter().enumerate() {
            if let Some(class) = class {
                chroma[*class][frame] += power.get(bin, frame);
            }
        }
        let peak = (0..N_CHROMA).map(|c| chroma[c][frame]).fold(0.0f32, f32::max);
        if peak > 0.0 {
            (0..N_CHROMA).for_each(|c| chroma[c][frame] /= peak);
        }
    }
    chroma
}

/// Peak-to-valley level per octave band, `None` for bands without bins
fn contrast(
    magnitudes: &Matrix,
    geometry: FrameGeometry,
    sample_rate: u32,
    fmin: f32,
    quantile: f32,
) -> Vec<Option<Vec<f32>>> {
    let freqs: Vec<f32> = (0..magnitudes.rows())
        .map(|bin| geometry.bin_frequency(bin, sample_rate))
        .collect();

    let mut edges = vec![0.0f32];
    edges.extend((0..=CONTRAST_BANDS).map(|k| fmin * 2f32.powi(k as i32)));

    (0..=CONTRAST_BANDS)
        .map(|band| {
            let (low, high) = (edges[band], edges[band + 1]);
            let inside: Vec<usize> = (0..freqs.len())
                .filter(|&bin| freqs[bin] >= low && freqs[bin] <= high)
                .collect();
            let (&first, &last) = (inside.first()?, inside.last()?);

            // Bands overlap their lower neighbour by one bin; the top band
            // also takes everything above its nominal edge
            let start = if band > 0 { first.saturating_sub(1) } else { first };
            let mut end = if band == CONTRAST_BANDS { freqs.len() } else { last + 1 };
            if band < CONTRAST_BANDS && end - start > 1 {
                end -= 1;
            }

            let width = end - start;
            let take = ((quantile * width as f32).round() as usize).max(1).min(width);
            let levels = (0..magnitudes.cols())
                .map(|frame| {
                    let mut values: Vec<f32> = (start..end).map(|bin| magnitudes.get(bin, frame)).collect();
                    values.sort_by(|a, b| a.total_cmp(b));
                    let valley = values[..take].iter().sum::<f32>() / take as f32;
                    let peak = values[width - take..].iter().sum::<f32>() / take as f32;
                    power_db(peak) - power_db(valley)
                })
                .collect();
            Some(levels)
        })
        .collect()
}

/// 6-D tonal centroid of L1-normalized chroma
fn tonnetz(chroma: &[Vec<f32>]) -> Vec<Vec<f32>> {
    const AXES: [(f32, f32); 3] = [(7.0 / 6.0, 1.0), (3.0 / 2.0, 1.0), (2.0 / 3.0, 0.5)];

    let frames = chroma.first().map_or(0, Vec::len);
    let mut output = vec![vec![0.0f32; frames]; 6];
    for frame in 0..frames {
        let norm: f32 = (0..N_CHROMA).map(|c| chroma[c][frame].abs()).sum();
        if norm <= 0.0 {
            continue;
        }
        for (axis, &(step, radius)) in AXES.iter().enumerate() {
            for (class, row) in chroma.iter().enumerate() {
                let angle = std::f32::consts::PI * step * class as f32;
                let weight = row[frame] / norm;
                output[2 * axis][frame] += radius * angle.sin() * weight;
                output[2 * axis + 1][frame] += radius * angle.cos() * weight;
            }
        }
    }
    output
}

fn flatten(rows: &[Vec<f32>]) -> Vec<f32> {
    rows.iter().flatten().copied().collect()
}

/// MFCC, chroma, spectral contrast and tonnetz summaries
pub fn extract(buffer: &AudioBuffer, config: &FeatureConfig) -> GroupResult {
    if buffer.is_empty() {
        return Err(degenerate("no samples"));
    }

    let sample_rate = buffer.sample_rate();
    let geometry = FrameGeometry::scaled(config.n_fft, config.hop_length, sample_rate);
    let mut values = Vec::with_capacity(crate::features::catalog::SPECTRAL.len());

    for (k, row) in mfcc(buffer, geometry, config.n_mels)?.iter().enumerate() {
        let (mean, std) = mean_std(row);
        values.push((format!("mfcc_{}_mean", k + 1), mean));
        values.push((format!("mfcc_{}_std", k + 1), std));
    }

    let magnitudes = Stft::new(geometry)
        .magnitudes(buffer.samples(), Framing::Centered, &CancelToken::new())
        .map_err(degenerate)?;
    let mut power = magnitudes.clone();
    power.map_inplace(|m| m * m);

    let chroma = chroma(&power, geometry, sample_rate);
    let (mean, std) = mean_std(&flatten(&chroma));
    values.push(("chroma_mean".to_string(), mean));
    values.push(("chroma_std".to_string(), std));
    for (class, row) in chroma.iter().enumerate() {
        values.push((format!("chroma_{}_mean", class + 1), mean_std(row).0));
    }

    let bands = contrast(
        &magnitudes,
        geometry,
        sample_rate,
        config.contrast_fmin,
        config.contrast_quantile,
    );
    let all_bands: Vec<f32> = bands.iter().flatten().flatten().copied().collect();
    let (mean, std) = mean_std(&all_bands);
    values.push(("spectral_contrast_mean".to_string(), mean));
    values.push(("spectral_contrast_std".to_string(), std));
    for (band, levels) in bands.iter().enumerate() {
        let value = levels.as_deref().map_or(FeatureValue::Undefined, |l| mean_std(l).0);
        values.push((format!("spectral_contrast_band_{}_mean", band + 1), value));
    }

    let tonnetz = tonnetz(&chroma);
    let (mean, std) = mean_std(&flatten(&tonnetz));
    values.push(("tonnetz_mean".to_string(), mean));
    values.push(("tonnetz_std".to_string(), std));
    for (axis, row) in tonnetz.iter().enumerate() {
        values.push((format!("tonnetz_{}_mean", axis + 1), mean_std(row).0));
    }

    Ok(GroupValues::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::catalog;
    use crate::transforms::tests::{noise, sine_buffer};

    fn lookup(values: &[(String, FeatureValue)], name: &str) -> f64 {
        values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_f64())
            .unwrap()
    }

    #[test]
    fn test_produces_exactly_the_catalog() {
        let buffer = sine_buffer(440.0, 22050, 22050);
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();
        let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, catalog::SPECTRAL);
        assert!(values.iter().all(|(_, v)| v.is_defined()));
    }

    #[test]
    fn test_a4_lands_in_pitch_class_a() {
        assert_eq!(pitch_class(440.0), 9);
        assert_eq!(pitch_class(261.63), 0);

        let buffer = sine_buffer(440.0, 22050, 22050);
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();
        let a = lookup(&values, "chroma_10_mean");
        assert!(a > 0.95, "A chroma {}", a);
        for class in (1..=12).filter(|&c| c != 10) {
            assert!(lookup(&values, &format!("chroma_{}_mean", class)) < a);
        }
    }

    #[test]
    fn test_silence_has_flat_cepstrum() {
        let buffer = AudioBuffer::new(vec![0.0; 22050], 22050).unwrap();
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();

        // Every mel band sits at the -100 dB floor
        assert!((lookup(&values, "mfcc_1_mean") + 100.0 * 128f64.sqrt()).abs() < 0.1);
        assert!(lookup(&values, "mfcc_2_mean").abs() < 0.01);
        assert!(lookup(&values, "mfcc_1_std") < 1e-9);
        assert_eq!(lookup(&values, "chroma_mean"), 0.0);
        assert_eq!(lookup(&values, "tonnetz_mean"), 0.0);
    }

    #[test]
    fn test_contrast_is_non_negative() {
        let buffer = AudioBuffer::new(noise(22050, 0.5, 11), 22050).unwrap();
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();
        for band in 1..=7 {
            assert!(lookup(&values, &format!("spectral_contrast_band_{}_mean", band)) >= 0.0);
        }
    }

    #[test]
    fn test_tonnetz_is_bounded() {
        let buffer = sine_buffer(330.0, 22050, 22050);
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();
        for axis in 1..=6 {
            assert!(lookup(&values, &format!("tonnetz_{}_mean", axis)).abs() <= 1.0);
        }
    }

    #[test]
    fn test_dct_of_constant_is_dc_only() {
        let coefficients = dct_ortho(&[2.0; 8], 4);
        assert!((coefficients[0] - 2.0 * 8f64.sqrt()).abs() < 1e-9);
        assert!(coefficients[1..].iter().all(|c| c.abs() < 1e-9));
    }
}
