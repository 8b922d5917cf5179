use std::f32::consts::PI;

/// Periodic Hann window, the DFT-even form used for spectral analysis
pub fn hann_periodic(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}

/// Symmetric Hann window, zero at both ends
pub fn hann_symmetric(len: usize) -> Vec<f32> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (len - 1) as f32).cos())
            .collect(),
    }
}

const MEL_F_SP: f32 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f32 = 1000.0;
const MEL_MIN_LOG_MEL: f32 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        mel * MEL_F_SP
    }
}

/// Triangular mel filter bank with Slaney area normalization.
///
/// Returns `n_mels` rows of `n_fft / 2 + 1` weights each.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Vec<Vec<f32>> {
    let bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f32> = (0..bins)
        .map(|bin| bin as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, centre, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let norm = 2.0 / (upper - lower);
            fft_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (centre - lower);
                    let falling = (upper - f) / (upper - centre);
                    rising.min(falling).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

/// Gaussian smoothing with reflected edges (`d c b a | a b c d | d c b a`),
/// kernel truncated at four standard deviations
pub fn gaussian_smooth(values: &[f32], sigma: f32) -> Vec<f32> {
    if values.is_empty() || sigma <= 0.0 {
        return values.to_vec();
    }

    let radius = (4.0 * sigma + 0.5) as isize;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f32 / sigma).powi(2)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);

    let len = values.len() as isize;
    let reflect = |mut i: isize| -> usize {
        // Period of the symmetric extension is 2 * len
        let period = 2 * len;
        i = i.rem_euclid(period);
        if i >= len {
            i = period - 1 - i;
        }
        i as usize
    };

    (0..len)
        .map(|centre| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &weight)| weight * values[reflect(centre + k as isize - radius)])
                .sum()
        })
        .collect()
}

/// Linear interpolation of `ys` sampled at ascending `xs`, clamped at the ends
pub fn interpolate(xs: &[f32], ys: &[f32], x: f32) -> f32 {
    match xs.len() {
        0 => 0.0,
        1 => ys[0],
        _ => {
            if x <= xs[0] {
                return ys[0];
            }
            let last = xs.len() - 1;
            if x >= xs[last] {
                return ys[last];
            }
            let upper = xs.partition_point(|&v| v < x).clamp(1, last);
            let (x0, x1) = (xs[upper - 1], xs[upper]);
            let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
            ys[upper - 1] + t * (ys[upper] - ys[upper - 1])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_shapes() {
        let periodic = hann_periodic(4);
        assert_eq!(periodic[0], 0.0);
        assert!((periodic[2] - 1.0).abs() < 1e-6);

        let symmetric = hann_symmetric(5);
        assert_eq!(symmetric[0], 0.0);
        assert!(symmetric[4].abs() < 1e-6);
        assert!((symmetric[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0, 500.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.05 * hz.max(1.0));
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let bank = mel_filterbank(22050, 2048, 128, 50.0, 8000.0);
        assert_eq!(bank.len(), 128);
        assert!(bank.iter().all(|row| row.len() == 1025));
        assert!(bank.iter().all(|row| row.iter().all(|&w| w >= 0.0)));
        // Nothing above fmax
        assert!(bank.iter().all(|row| row[800] == 0.0));
    }

    #[test]
    fn test_gaussian_smooth_preserves_constant() {
        let smoothed = gaussian_smooth(&[3.0; 10], 1.0);
        assert!(smoothed.iter().all(|&v| (v - 3.0).abs() < 1e-5));
    }

    #[test]
    fn test_gaussian_smooth_spreads_impulse() {
        let mut impulse = vec![0.0; 21];
        impulse[10] = 1.0;
        let smoothed = gaussian_smooth(&impulse, 1.0);
        assert!((smoothed.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(smoothed[10] < 0.5);
        assert!((smoothed[9] - smoothed[11]).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 30.0];
        assert_eq!(interpolate(&xs, &ys, 0.5), 5.0);
        assert_eq!(interpolate(&xs, &ys, 1.5), 20.0);
        assert_eq!(interpolate(&xs, &ys, -1.0), 0.0);
        assert_eq!(interpolate(&xs, &ys, 5.0), 30.0);
    }
}
