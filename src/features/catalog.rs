//! Static table of every feature name and the category it belongs to.
//!
//! The order here is the order features appear in exports.

use crate::features::FeatureCategory;

pub const TIME: &[&str] = &[
    "rms_energy_mean",
    "rms_energy_std",
    "zero_crossing_rate_mean",
    "zero_crossing_rate_std",
    "peak_amplitude",
    "crest_factor",
    "mean_amplitude",
    "std_amplitude",
    "skewness_amplitude",
    "kurtosis_amplitude",
    "dynamic_range",
];

pub const FREQUENCY: &[&str] = &[
    "spectral_centroid",
    "spectral_bandwidth",
    "spectral_rolloff",
    "spectral_flatness",
    "spectral_centroid_std",
    "spectral_bandwidth_std",
    "spectral_rolloff_std",
    "spectral_flatness_std",
];

pub const SPECTRAL: &[&str] = &[
    "mfcc_1_mean",
    "mfcc_1_std",
    "mfcc_2_mean",
    "mfcc_2_std",
    "mfcc_3_mean",
    "mfcc_3_std",
    "mfcc_4_mean",
    "mfcc_4_std",
    "mfcc_5_mean",
    "mfcc_5_std",
    "mfcc_6_mean",
    "mfcc_6_std",
    "mfcc_7_mean",
    "mfcc_7_std",
    "mfcc_8_mean",
    "mfcc_8_std",
    "mfcc_9_mean",
    "mfcc_9_std",
    "mfcc_10_mean",
    "mfcc_10_std",
    "mfcc_11_mean",
    "mfcc_11_std",
    "mfcc_12_mean",
    "mfcc_12_std",
    "mfcc_13_mean",
    "mfcc_13_std",
    "chroma_mean",
    "chroma_std",
    "chroma_1_mean",
    "chroma_2_mean",
    "chroma_3_mean",
    "chroma_4_mean",
    "chroma_5_mean",
    "chroma_6_mean",
    "chroma_7_mean",
    "chroma_8_mean",
    "chroma_9_mean",
    "chroma_10_mean",
    "chroma_11_mean",
    "chroma_12_mean",
    "spectral_contrast_mean",
    "spectral_contrast_std",
    "spectral_contrast_band_1_mean",
    "spectral_contrast_band_2_mean",
    "spectral_contrast_band_3_mean",
    "spectral_contrast_band_4_mean",
    "spectral_contrast_band_5_mean",
    "spectral_contrast_band_6_mean",
    "spectral_contrast_band_7_mean",
    "tonnetz_mean",
    "tonnetz_std",
    "tonnetz_1_mean",
    "tonnetz_2_mean",
    "tonnetz_3_mean",
    "tonnetz_4_mean",
    "tonnetz_5_mean",
    "tonnetz_6_mean",
];

pub const RHYTHM: &[&str] = &[
    "tempo",
    "beat_count",
    "beat_interval_mean",
    "beat_interval_std",
    "beat_regularity",
    "onset_count",
    "onset_interval_mean",
    "onset_interval_std",
];

/// Names produced by one group, in export order
pub fn names(category: FeatureCategory) -> &'static [&'static str] {
    match category {
        FeatureCategory::Time => TIME,
        FeatureCategory::Frequency => FREQUENCY,
        FeatureCategory::Spectral => SPECTRAL,
        FeatureCategory::Rhythm => RHYTHM,
    }
}

/// Category of a feature name, `None` for names outside the catalog
pub fn category_of(name: &str) -> Option<FeatureCategory> {
    FeatureCategory::ALL
        .into_iter()
        .find(|&category| names(category).contains(&name))
}

/// Total number of catalogued features
pub fn len() -> usize {
    FeatureCategory::ALL.iter().map(|&c| names(c).len()).sum()
}
