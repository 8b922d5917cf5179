use crate::dsp::matrix::Matrix;

/// Reference level for decibel conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DbReference {
    /// Loudest cell maps to 0 dB
    Max,
    /// Fixed reference value
    Value(f32),
}

const POWER_AMIN: f32 = 1e-10;
const AMPLITUDE_AMIN: f32 = 1e-5;

/// Convert a power matrix to decibels in place.
///
/// Values are floored at `1e-10` and, when `top_db` is given, clipped to
/// `top_db` below the loudest cell.
pub fn power_to_db(matrix: &mut Matrix, reference: DbReference, top_db: Option<f32>) {
    to_db(matrix, reference, POWER_AMIN, top_db);
}

/// Convert an amplitude matrix to decibels in place (`20 log10`).
pub fn amplitude_to_db(matrix: &mut Matrix, reference: DbReference, top_db: Option<f32>) {
    matrix.map_inplace(|v| v * v);
    let reference = match reference {
        DbReference::Max => DbReference::Max,
        DbReference::Value(value) => DbReference::Value(value * value),
    };
    to_db(matrix, reference, AMPLITUDE_AMIN * AMPLITUDE_AMIN, top_db);
}

fn to_db(matrix: &mut Matrix, reference: DbReference, amin: f32, top_db: Option<f32>) {
    let reference = match reference {
        DbReference::Max => matrix.max(),
        DbReference::Value(value) => value.abs(),
    };
    let offset = 10.0 * reference.max(amin).log10();

    matrix.map_inplace(|v| 10.0 * v.max(amin).log10() - offset);

    if let Some(top_db) = top_db {
        let (_, ceiling) = matrix.min_max();
        let floor = ceiling - top_db;
        matrix.map_inplace(|v| v.max(floor));
    }
}

/// Scalar power to decibels with a fixed reference of 1
pub fn power_db(value: f32) -> f32 {
    10.0 * value.max(POWER_AMIN).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_to_db_reference_max() {
        let mut m = Matrix::from_rows(vec![vec![1.0, 0.1, 0.01]]).unwrap();
        power_to_db(&mut m, DbReference::Max, None);
        let row = m.row(0);
        assert!(row[0].abs() < 1e-5);
        assert!((row[1] + 10.0).abs() < 1e-4);
        assert!((row[2] + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_top_db_clips() {
        let mut m = Matrix::from_rows(vec![vec![1.0, 1e-12]]).unwrap();
        power_to_db(&mut m, DbReference::Max, Some(80.0));
        assert_eq!(m.row(0)[1], -80.0);
    }

    #[test]
    fn test_amplitude_to_db_uses_twenty_log() {
        let mut m = Matrix::from_rows(vec![vec![1.0, 0.1]]).unwrap();
        amplitude_to_db(&mut m, DbReference::Max, Some(80.0));
        assert!((m.row(0)[1] + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_silence_is_flat() {
        let mut m = Matrix::zeros(3, 3);
        power_to_db(&mut m, DbReference::Max, Some(80.0));
        assert!(m.data().iter().all(|&v| v == 0.0));
    }
}
