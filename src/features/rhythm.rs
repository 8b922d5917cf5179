//! Tempo, beat and onset descriptors.
//!
//! Everything is derived from one onset-strength envelope: the mean positive
//! frame-to-frame rise of the log-mel spectrogram. Motor recordings are often
//! steady hums with no pulse at all, so the group refuses to report a tempo
//! or beats unless the envelope shows a real periodicity. Onset statistics
//! are reported either way.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::filters::hann_symmetric;
use crate::dsp::scale::{power_to_db, DbReference};
use crate::dsp::stats::{interval_stats, mean, std_dev};
use crate::dsp::FrameGeometry;
use crate::error::{ConfigError, FeatureError};
use crate::features::{FeatureConfig, FeatureValue, GroupResult, GroupValues};
use crate::pipeline::CancelToken;
use crate::transforms::invalid;
use crate::transforms::mel::mel_power;

/// Rhythm analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmParams {
    /// Shorter recordings get no rhythm features
    pub min_duration_secs: f32,
    /// Normalized autocorrelation the envelope must reach somewhere in the tempo range
    pub min_periodicity: f32,
    /// Centre of the log-normal tempo prior (BPM)
    pub tempo_prior_bpm: f32,
    /// Width of the tempo prior in octaves
    pub tempo_prior_std: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// How strongly the beat tracker holds to the estimated period
    pub tightness: f32,
    /// Threshold above the local mean for onset peaks, on the 0-1 envelope
    pub onset_delta: f32,
}

impl Default for RhythmParams {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            min_periodicity: 0.05,
            tempo_prior_bpm: 120.0,
            tempo_prior_std: 1.0,
            min_bpm: 30.0,
            max_bpm: 300.0,
            tightness: 100.0,
            onset_delta: 0.07,
        }
    }
}

impl RhythmParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_duration_secs >= 0.0) {
            return Err(invalid("features.rhythm.min_duration_secs", self.min_duration_secs));
        }
        if !(self.min_periodicity >= 0.0 && self.min_periodicity < 1.0) {
            return Err(invalid("features.rhythm.min_periodicity", self.min_periodicity));
        }
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(invalid(
                "features.rhythm.bpm_range",
                format!("{}-{}", self.min_bpm, self.max_bpm),
            ));
        }
        if !(self.tempo_prior_bpm > 0.0) {
            return Err(invalid("features.rhythm.tempo_prior_bpm", self.tempo_prior_bpm));
        }
        if !(self.tempo_prior_std > 0.0) {
            return Err(invalid("features.rhythm.tempo_prior_std", self.tempo_prior_std));
        }
        if !(self.tightness > 0.0) {
            return Err(invalid("features.rhythm.tightness", self.tightness));
        }
        if !(self.onset_delta >= 0.0) {
            return Err(invalid("features.rhythm.onset_delta", self.onset_delta));
        }
        Ok(())
    }
}

/// Mean positive log-mel flux per frame; frame 0 is always zero
fn onset_envelope(buffer: &AudioBuffer, geometry: FrameGeometry, n_mels: usize) -> Result<Vec<f32>, FeatureError> {
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
    .map_err(|e| FeatureError::Degenerate { reason: e.to_string() })?;
    power_to_db(&mut mel, DbReference::Value(1.0), Some(80.0));

    let frames = mel.cols();
    let mut envelope = vec![0.0f32; frames];
    for (frame, value) in envelope.iter_mut().enumerate().skip(1) {
        let rise: f32 = (0..mel.rows())
            .map(|band| (mel.get(band, frame) - mel.get(band, frame - 1)).max(0.0))
            .sum();
        *value = rise / mel.rows() as f32;
    }
    Ok(envelope)
}

/// Autocorrelation of `values` for lags `0..=max_lag`
fn autocorrelation(values: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag.min(values.len().saturating_sub(1)))
        .map(|lag| values.iter().zip(&values[lag..]).map(|(a, b)| a * b).sum())
        .collect()
}

/// Tempo search range in frames, `(shortest, longest)` lag
fn lag_range(params: &RhythmParams, frame_rate: f64, frames: usize) -> (usize, usize) {
    let shortest = (60.0 * frame_rate / params.max_bpm as f64).ceil().max(1.0) as usize;
    let longest = ((60.0 * frame_rate / params.min_bpm as f64).floor() as usize).min(frames.saturating_sub(1));
    (shortest, longest)
}

/// Tempo from the envelope autocorrelation weighted by a log-normal prior.
///
/// The winning lag is refined by a parabola through its neighbours.
fn estimate_tempo(ac: &[f64], range: (usize, usize), frame_rate: f64, params: &RhythmParams) -> Option<f64> {
    let (shortest, longest) = range;
    let prior_centre = (params.tempo_prior_bpm as f64).log2();
    let score = |lag: usize| -> f64 {
        let bpm = 60.0 * frame_rate / lag as f64;
        let z = (bpm.log2() - prior_centre) / params.tempo_prior_std as f64;
        ac[lag].max(0.0) * (-0.5 * z * z).exp()
    };

    let best = (shortest..=longest)
        .filter(|&lag| lag < ac.len())
        .max_by(|&a, &b| score(a).total_cmp(&score(b)))?;
    if score(best) <= 0.0 {
        return None;
    }

    let mut lag = best as f64;
    if best > shortest && best < longest && best + 1 < ac.len() {
        let (left, centre, right) = (score(best - 1), score(best), score(best + 1));
        let curvature = left - 2.0 * centre + right;
        if curvature < 0.0 {
            lag += 0.5 * (left - right) / curvature;
        }
    }
    Some(60.0 * frame_rate / lag)
}

/// Dynamic-programming beat tracker; returns beat frames in order
fn track_beats(envelope: &[f32], tempo: f64, frame_rate: f64, tightness: f64) -> Vec<usize> {
    let period = (60.0 * frame_rate / tempo).round().max(1.0) as usize;
    let spread = std_dev(envelope) * (envelope.len() as f64 / (envelope.len() as f64 - 1.0).max(1.0)).sqrt();
    if spread <= 0.0 {
        return Vec::new();
    }

    // Onsets smoothed by a Gaussian one period wide
    let kernel: Vec<f64> = (-(period as isize)..=period as isize)
        .map(|offset| (-0.5 * (offset as f64 * 32.0 / period as f64).powi(2)).exp())
        .collect();
    let local: Vec<f64> = (0..envelope.len() as isize)
        .map(|centre| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let index = centre + k as isize - period as isize;
                    envelope.get(usize::try_from(index).ok()?).map(|&e| w * e as f64 / spread)
                })
                .sum()
        })
        .collect();
    let local_max = local.iter().copied().fold(0.0f64, f64::max);

    let mut cumulative = vec![0.0f64; local.len()];
    let mut backlink: Vec<Option<usize>> = vec![None; local.len()];
    let mut first_beat = true;
    for i in 0..local.len() {
        let earliest = i.saturating_sub(2 * period);
        let latest = i.checked_sub((period as f64 / 2.0).round() as usize);

        let best = latest.and_then(|latest| {
            (earliest..=latest)
                .map(|prev| {
                    let gap = (i - prev) as f64 / period as f64;
                    (prev, cumulative[prev] - tightness * gap.ln().powi(2))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
        });

        cumulative[i] = local[i] + best.map_or(0.0, |(_, score)| score);
        if first_beat && local[i] < 0.01 * local_max {
            backlink[i] = None;
        } else {
            backlink[i] = best.map(|(prev, _)| prev);
            first_beat = false;
        }
    }

    let Some(last) = last_beat(&cumulative) else {
        return Vec::new();
    };
    let mut beats = vec![last];
    while let Some(prev) = backlink[beats[beats.len() - 1]] {
        beats.push(prev);
    }
    beats.reverse();
    trim_weak_ends(&beats, &local)
}

/// Last local maximum of the cumulative score that reaches half the median peak
fn last_beat(cumulative: &[f64]) -> Option<usize> {
    let peaks: Vec<usize> = (0..cumulative.len())
        .filter(|&i| {
            let left = if i == 0 { cumulative[0] } else { cumulative[i - 1] };
            let right = cumulative.get(i + 1).copied().unwrap_or(f64::NEG_INFINITY);
            cumulative[i] > left && cumulative[i] >= right
        })
        .collect();
    let mut heights: Vec<f64> = peaks.iter().map(|&i| cumulative[i]).collect();
    heights.sort_by(|a, b| a.total_cmp(b));
    let median = *heights.get(heights.len() / 2)?;
    peaks.into_iter().rev().find(|&i| cumulative[i] >= 0.5 * median)
}

/// Drop leading and trailing beats that sit on weak onsets
fn trim_weak_ends(beats: &[usize], local: &[f64]) -> Vec<usize> {
    let window = hann_symmetric(5);
    let half = window.len() as isize / 2;
    let at_beats: Vec<f64> = beats.iter().map(|&b| local[b]).collect();
    let smoothed: Vec<f64> = (0..at_beats.len() as isize)
        .map(|centre| {
            window
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let index = usize::try_from(centre + k as isize - half).ok()?;
                    at_beats.get(index).map(|&v| w as f64 * v)
                })
                .sum()
        })
        .collect();
    if smoothed.is_empty() {
        return Vec::new();
    }
    let threshold = 0.5 * (smoothed.iter().map(|v| v * v).sum::<f64>() / smoothed.len() as f64).sqrt();

    let start = beats.iter().position(|&b| local[b] > threshold);
    let end = beats.iter().rposition(|&b| local[b] > threshold);
    match (start, end) {
        (Some(start), Some(end)) => beats[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

/// Frame offsets for adaptive peak picking, scaled from seconds
struct PeakWindows {
    pre_max: usize,
    post_max: usize,
    pre_avg: usize,
    post_avg: usize,
    wait: usize,
}

impl PeakWindows {
    fn at(frame_rate: f64) -> Self {
        let frames = |secs: f64| (secs * frame_rate).floor() as usize;
        Self {
            pre_max: frames(0.03),
            post_max: 1,
            pre_avg: frames(0.10),
            post_avg: frames(0.10) + 1,
            wait: frames(0.03),
        }
    }
}

/// Onset frames: local maxima that clear the local mean by `delta`
fn pick_onsets(envelope: &[f32], delta: f32, windows: &PeakWindows) -> Vec<usize> {
    let (lo, hi) = envelope
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if !(span > 0.0) {
        return Vec::new();
    }
    let normalized: Vec<f32> = envelope.iter().map(|&v| (v - lo) / span).collect();
    let n = normalized.len();

    let mut onsets: Vec<usize> = Vec::new();
    for i in 0..n {
        let max_window = &normalized[i.saturating_sub(windows.pre_max)..(i + windows.post_max).min(n)];
        let is_max = max_window.iter().all(|&v| v <= normalized[i]);
        let avg_window = &normalized[i.saturating_sub(windows.pre_avg)..(i + windows.post_avg).min(n)];
        let clears_mean = normalized[i] as f64 >= mean(avg_window) + delta as f64;
        let waited = onsets.last().map_or(true, |&last| i > last + windows.wait);

        if is_max && clears_mean && waited {
            onsets.push(i);
        }
    }
    onsets
}

fn interval_features(prefix: &str, times: &[f64]) -> [(String, FeatureValue); 2] {
    let (mean, std) = interval_stats(times).map_or((FeatureValue::Undefined, FeatureValue::Undefined), |(m, s)| {
        (m.into(), s.into())
    });
    [
        (format!("{}_interval_mean", prefix), mean),
        (format!("{}_interval_std", prefix), std),
    ]
}

/// Tempo, beat and onset statistics
pub fn extract(buffer: &AudioBuffer, config: &FeatureConfig) -> GroupResult {
    let params = &config.rhythm;
    let duration = buffer.duration();
    if duration < params.min_duration_secs as f64 {
        return Err(FeatureError::InsufficientDuration {
            duration,
            required: params.min_duration_secs as f64,
        });
    }

    let sample_rate = buffer.sample_rate();
    let geometry = FrameGeometry::scaled(config.n_fft, config.hop_length, sample_rate);
    let frame_rate = sample_rate as f64 / geometry.hop as f64;
    let envelope = onset_envelope(buffer, geometry, config.n_mels)?;

    if envelope.iter().all(|&v| v <= 0.0) {
        return Err(FeatureError::Silent);
    }
    let onsets = to_seconds(pick_onsets(&envelope, params.onset_delta, &PeakWindows::at(frame_rate)), frame_rate);
    let mut onset_values: Vec<(String, FeatureValue)> = vec![("onset_count".to_string(), (onsets.len() as f64).into())];
    onset_values.extend(interval_features("onset", &onsets));

    // Onsets stand on their own; only tempo and beats need a pulse
    let (tempo, beats) = match pulse(&envelope, frame_rate, params) {
        Ok(pulse) => pulse,
        Err(caveat) => {
            tracing::debug!("No tempo: {}", caveat);
            return Ok(GroupValues::partial(onset_values, caveat));
        }
    };

    let regularity = interval_stats(&beats).map_or(FeatureValue::Undefined, |(_, std)| (1.0 / (1.0 + std)).into());

    let mut values = vec![
        ("tempo".to_string(), tempo.into()),
        ("beat_count".to_string(), (beats.len() as f64).into()),
    ];
    values.extend(interval_features("beat", &beats));
    values.push(("beat_regularity".to_string(), regularity));
    values.extend(onset_values);
    Ok(GroupValues::new(values))
}

fn to_seconds(frames: Vec<usize>, frame_rate: f64) -> Vec<f64> {
    frames.into_iter().map(|f| f as f64 / frame_rate).collect()
}

/// Tempo (BPM) and beat times, provided the envelope is periodic enough
fn pulse(envelope: &[f32], frame_rate: f64, params: &RhythmParams) -> Result<(f64, Vec<f64>), FeatureError> {
    let centre = mean(envelope);
    let centred: Vec<f64> = envelope.iter().map(|&v| v as f64 - centre).collect();
    let ac = autocorrelation(&centred, envelope.len());
    if !(ac[0] > 0.0) {
        return Err(FeatureError::Degenerate {
            reason: "onset envelope is flat".to_string(),
        });
    }

    let range = lag_range(params, frame_rate, envelope.len());
    let strength = (range.0..=range.1)
        .filter_map(|lag| ac.get(lag))
        .map(|&v| v / ac[0])
        .fold(f64::NEG_INFINITY, f64::max);
    if !(strength >= params.min_periodicity as f64) {
        return Err(FeatureError::Aperiodic {
            strength: strength.max(0.0) as f32,
            required: params.min_periodicity,
        });
    }

    let tempo = estimate_tempo(&ac, range, frame_rate, params).ok_or_else(|| FeatureError::Aperiodic {
        strength: strength as f32,
        required: params.min_periodicity,
    })?;
    tracing::debug!("Estimated tempo {:.1} BPM (periodicity {:.3})", tempo, strength);

    let beats = to_seconds(track_beats(envelope, tempo, frame_rate, params.tightness as f64), frame_rate);
    Ok((tempo, beats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::catalog;
    use crate::transforms::tests::sine_buffer;

    /// Single-sample clicks every `period` seconds, starting at `offset`
    fn click_train(period: f64, offset: f64, duration: f64, sample_rate: u32) -> AudioBuffer {
        let len = (duration * sample_rate as f64) as usize;
        let mut samples = vec![0.0f32; len];
        let mut t = offset;
        while t < duration {
            samples[(t * sample_rate as f64) as usize] = 1.0;
            t += period;
        }
        AudioBuffer::new(samples, sample_rate).unwrap()
    }

    fn lookup(values: &[(String, FeatureValue)], name: &str) -> FeatureValue {
        values.iter().find(|(n, _)| n == name).map(|(_, v)| *v).unwrap()
    }

    #[test]
    fn test_click_train_at_120_bpm() {
        let buffer = click_train(0.5, 0.25, 4.0, 22050);
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();

        let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, catalog::RHYTHM);

        let tempo = lookup(&values, "tempo").as_f64().unwrap();
        assert!((tempo - 120.0).abs() < 6.0, "tempo {}", tempo);

        let onsets = lookup(&values, "onset_count").as_f64().unwrap();
        assert!((7.0..=9.0).contains(&onsets), "onsets {}", onsets);
        let onset_interval = lookup(&values, "onset_interval_mean").as_f64().unwrap();
        assert!((onset_interval - 0.5).abs() < 0.03, "onset interval {}", onset_interval);

        let beats = lookup(&values, "beat_count").as_f64().unwrap();
        assert!(beats >= 4.0, "beats {}", beats);
        let beat_interval = lookup(&values, "beat_interval_mean").as_f64().unwrap();
        assert!((beat_interval - 0.5).abs() < 0.05, "beat interval {}", beat_interval);
        assert!(lookup(&values, "beat_regularity").as_f64().unwrap() > 0.9);
    }

    #[test]
    fn test_too_short() {
        let buffer = click_train(0.25, 0.1, 0.5, 22050);
        assert!(matches!(
            extract(&buffer, &FeatureConfig::default()),
            Err(FeatureError::InsufficientDuration { .. })
        ));
    }

    #[test]
    fn test_silence() {
        let buffer = AudioBuffer::new(vec![0.0; 44100], 22050).unwrap();
        assert_eq!(extract(&buffer, &FeatureConfig::default()), Err(FeatureError::Silent));
    }

    #[test]
    fn test_steady_tone_keeps_onsets_without_tempo() {
        let buffer = sine_buffer(440.0, 22050, 22050 * 3);
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();

        assert!(matches!(values.caveat(), Some(FeatureError::Aperiodic { .. })));
        assert!(values.iter().all(|(name, _)| name.starts_with("onset_")));
        assert!(lookup(&values, "onset_count").is_defined());
    }

    #[test]
    fn test_hum_with_clicks_reports_onsets() {
        let sample_rate = 22050;
        let len = sample_rate as usize * 3;
        let mut samples: Vec<f32> = (0..len)
            .map(|i| 0.2 * (2.0 * std::f32::consts::PI * 100.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        for t in [0.6, 1.3, 1.6, 2.4] {
            samples[(t * sample_rate as f64) as usize] = 1.0;
        }
        let buffer = AudioBuffer::new(samples, sample_rate).unwrap();
        let values = extract(&buffer, &FeatureConfig::default()).unwrap();

        let onsets = lookup(&values, "onset_count").as_f64().unwrap();
        assert!((3.0..=6.0).contains(&onsets), "onsets {}", onsets);
        assert!(lookup(&values, "onset_interval_mean").is_defined());
    }

    #[test]
    fn test_peak_picking_respects_wait() {
        let windows = PeakWindows {
            pre_max: 1,
            post_max: 1,
            pre_avg: 2,
            post_avg: 2,
            wait: 2,
        };
        let envelope = [0.0, 1.0, 0.0, 0.9, 0.0, 0.0, 0.0, 1.0, 0.0];
        // The peak at 3 is within the wait after 1
        assert_eq!(pick_onsets(&envelope, 0.07, &windows), vec![1, 7]);
    }

    #[test]
    fn test_params_validation() {
        assert!(RhythmParams::default().validate().is_ok());
        let params = RhythmParams {
            min_bpm: 400.0,
            ..RhythmParams::default()
        };
        assert!(params.validate().is_err());
    }
}
