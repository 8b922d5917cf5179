//! Descriptive statistics over `f32` slices, accumulated in `f64`.

pub fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f32]) -> f64 {
    central_moment(values, 2).sqrt()
}

fn central_moment(values: &[f32], order: i32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|&v| (v as f64 - mu).powi(order)).sum::<f64>() / values.len() as f64
}

/// Biased sample skewness, `None` when the variance is zero
pub fn skewness(values: &[f32]) -> Option<f64> {
    let m2 = central_moment(values, 2);
    if m2 <= f64::EPSILON * mean_square(values) {
        return None;
    }
    Some(central_moment(values, 3) / m2.powf(1.5))
}

/// Biased Fisher (excess) kurtosis, `None` when the variance is zero
pub fn excess_kurtosis(values: &[f32]) -> Option<f64> {
    let m2 = central_moment(values, 2);
    if m2 <= f64::EPSILON * mean_square(values) {
        return None;
    }
    Some(central_moment(values, 4) / (m2 * m2) - 3.0)
}

fn mean_square(values: &[f32]) -> f64 {
    mean(&values.iter().map(|v| v * v).collect::<Vec<_>>())
}

/// Linear-interpolated quantile of already sorted values, `q` in [0, 1]
pub fn quantile_sorted(sorted: &[f32], q: f64) -> f32 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let t = (position - lower as f64) as f32;
            sorted[lower] + t * (sorted[upper] - sorted[lower])
        }
    }
}

/// Mean and standard deviation of successive differences
pub fn interval_stats(times: &[f64]) -> Option<(f64, f64)> {
    if times.len() < 2 {
        return None;
    }
    let intervals: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let mu = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let var = intervals.iter().map(|i| (i - mu).powi(2)).sum::<f64>() / intervals.len() as f64;
    Some((mu, var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(std_dev(&values), 2.0);
    }

    #[test]
    fn test_moments_of_constant_are_undefined() {
        assert_eq!(skewness(&[1.0; 8]), None);
        assert_eq!(excess_kurtosis(&[0.0; 8]), None);
    }

    #[test]
    fn test_symmetric_two_point_distribution() {
        let values = [-1.0, 1.0, -1.0, 1.0];
        assert!(skewness(&values).unwrap().abs() < 1e-12);
        // Two-point distribution has the minimum possible excess kurtosis
        assert!((excess_kurtosis(&values).unwrap() + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantile() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), 2.0);
        assert_eq!(quantile_sorted(&sorted, 0.125), 0.5);
        assert_eq!(quantile_sorted(&sorted, 1.0), 4.0);
    }

    #[test]
    fn test_interval_stats() {
        assert_eq!(interval_stats(&[1.0]), None);
        let (mu, sd) = interval_stats(&[0.0, 0.5, 1.0, 1.5]).unwrap();
        assert_eq!(mu, 0.5);
        assert_eq!(sd, 0.0);
    }
}
