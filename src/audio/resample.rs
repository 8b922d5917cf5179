use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::AudioError;

/// Resample mono audio from `from_rate` to `to_rate`.
///
/// The whole clip is processed as a single chunk, which is fine for the
/// bounded recordings this crate accepts.
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| AudioError::Decode {
            reason: format!("failed to create resampler: {}", e),
        })?;

    let input = vec![samples.to_vec()];
    let mut resampled = resampler
        .process(&input, None)
        .map_err(|e| AudioError::Decode {
            reason: format!("resampling failed: {}", e),
        })?
        .into_iter()
        .next()
        .unwrap_or_default();

    // The last half filter length of input is held back until more arrives;
    // a chunk of silence pushes it through.
    let tail = resampler
        .process_partial(None::<&[Vec<f32>]>, None)
        .map_err(|e| AudioError::Decode {
            reason: format!("resampler flush failed: {}", e),
        })?;
    if let Some(tail) = tail.into_iter().next() {
        resampled.extend(tail);
    }

    let expected = (samples.len() as f64 * ratio).round() as usize;
    resampled.resize(expected, 0.0);

    tracing::debug!(
        "Resampled {} samples at {} Hz to {} samples at {} Hz",
        samples.len(),
        from_rate,
        resampled.len(),
        to_rate
    );

    Ok(resampled)
}
