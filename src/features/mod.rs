//! # Feature Extractor
//!
//! Four independent groups of scalar descriptors computed from the same
//! [`AudioBuffer`]:
//!
//! - [`time`]: energy, zero crossings and amplitude statistics
//! - [`frequency`]: centroid, bandwidth, rolloff and flatness
//! - [`spectral`]: MFCC, chroma, spectral contrast and tonnetz
//! - [`rhythm`]: tempo, beats and onsets
//!
//! A group that cannot produce meaningful values reports a [`FeatureError`];
//! its features are then all [`FeatureValue::Undefined`] and the failure is
//! kept as a [`GroupFailure`] annotation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{ConfigError, FeatureError};
use crate::transforms::invalid;

pub mod catalog;
pub mod frequency;
pub mod rhythm;
pub mod spectral;
pub mod time;

pub use rhythm::RhythmParams;

/// Feature family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureCategory {
    Time,
    Frequency,
    Spectral,
    Rhythm,
}

impl FeatureCategory {
    pub const ALL: [FeatureCategory; 4] = [Self::Time, Self::Frequency, Self::Spectral, Self::Rhythm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Frequency => "frequency",
            Self::Spectral => "spectral",
            Self::Rhythm => "rhythm",
        }
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar feature value, or the sentinel for "not meaningful here".
///
/// Serializes as a number or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum FeatureValue {
    Defined(f64),
    Undefined,
}

impl FeatureValue {
    /// Non-finite numbers collapse to `Undefined`
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Self::Defined(value)
        } else {
            Self::Undefined
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Defined(value) => Some(*value),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Undefined, Self::from_f64)
    }
}

impl From<FeatureValue> for Option<f64> {
    fn from(value: FeatureValue) -> Self {
        value.as_f64()
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

/// One named, categorised value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub category: FeatureCategory,
    pub value: FeatureValue,
}

/// Why a group produced no values, or only some of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub category: FeatureCategory,
    pub reason: String,
}

/// Name/value pairs from one group.
///
/// A group that could compute only part of its table sets `caveat` to the
/// reason the rest is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupValues {
    values: Vec<(String, FeatureValue)>,
    caveat: Option<FeatureError>,
}

impl GroupValues {
    pub fn new(values: Vec<(String, FeatureValue)>) -> Self {
        Self { values, caveat: None }
    }

    pub fn partial(values: Vec<(String, FeatureValue)>, caveat: FeatureError) -> Self {
        Self {
            values,
            caveat: Some(caveat),
        }
    }

    pub fn caveat(&self) -> Option<&FeatureError> {
        self.caveat.as_ref()
    }
}

impl From<Vec<(String, FeatureValue)>> for GroupValues {
    fn from(values: Vec<(String, FeatureValue)>) -> Self {
        Self::new(values)
    }
}

impl std::ops::Deref for GroupValues {
    type Target = [(String, FeatureValue)];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

/// Raw output of one group: its values or the reason it gave up
pub type GroupResult = Result<GroupValues, FeatureError>;

/// Ordered feature table for one recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    features: Vec<Feature>,
    failures: Vec<GroupFailure>,
}

impl FeatureSet {
    /// Assemble group outputs in catalog order.
    ///
    /// Every catalogued name of a group is present exactly once; names a
    /// group did not produce are `Undefined`.
    pub fn assemble(groups: Vec<(FeatureCategory, GroupResult)>) -> Self {
        let mut set = Self::default();

        for (category, result) in groups {
            let produced = match result {
                Ok(values) => {
                    if let Some(caveat) = values.caveat() {
                        tracing::warn!("Some {} features unavailable: {}", category, caveat);
                        set.failures.push(GroupFailure {
                            category,
                            reason: caveat.to_string(),
                        });
                    }
                    values
                }
                Err(error) => {
                    tracing::warn!("{} features unavailable: {}", category, error);
                    set.failures.push(GroupFailure {
                        category,
                        reason: error.to_string(),
                    });
                    GroupValues::default()
                }
            };

            for (name, _) in produced.iter() {
                if catalog::category_of(name) != Some(category) {
                    tracing::warn!("Dropping uncatalogued {} feature '{}'", category, name);
                }
            }

            for &name in catalog::names(category) {
                let value = produced
                    .iter()
                    .find(|(produced_name, _)| produced_name == name)
                    .map_or(FeatureValue::Undefined, |(_, value)| *value);
                set.features.push(Feature {
                    name: name.to_string(),
                    category,
                    value,
                });
            }
        }

        set
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.features.iter().find(|f| f.name == name).map(|f| f.value)
    }

    /// Defined value of `name`, if any
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Groups that failed as a whole
    pub fn failures(&self) -> &[GroupFailure] {
        &self.failures
    }

    pub fn defined_count(&self) -> usize {
        self.features.iter().filter(|f| f.value.is_defined()).count()
    }
}

/// Framing and threshold settings shared by the feature groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Share of spectral magnitude below the rolloff frequency
    pub rolloff_percent: f32,
    /// Mel bands feeding the MFCC
    pub n_mels: usize,
    /// Upper edge of the lowest contrast band (Hz)
    pub contrast_fmin: f32,
    pub contrast_quantile: f32,
    pub rhythm: RhythmParams,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            rolloff_percent: 0.85,
            n_mels: 128,
            contrast_fmin: 200.0,
            contrast_quantile: 0.02,
            rhythm: RhythmParams::default(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_fft < 16 || !self.n_fft.is_power_of_two() {
            return Err(invalid("features.n_fft", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("features.hop_length", self.hop_length));
        }
        if !(self.rolloff_percent > 0.0 && self.rolloff_percent < 1.0) {
            return Err(invalid("features.rolloff_percent", self.rolloff_percent));
        }
        if self.n_mels < 13 {
            return Err(invalid("features.n_mels", self.n_mels));
        }
        if !(self.contrast_fmin > 0.0) {
            return Err(invalid("features.contrast_fmin", self.contrast_fmin));
        }
        if !(self.contrast_quantile > 0.0 && self.contrast_quantile < 0.5) {
            return Err(invalid("features.contrast_quantile", self.contrast_quantile));
        }
        self.rhythm.validate()
    }
}

/// Run one group
pub fn extract(category: FeatureCategory, buffer: &AudioBuffer, config: &FeatureConfig) -> GroupResult {
    let result = match category {
        FeatureCategory::Time => time::extract(buffer, config),
        FeatureCategory::Frequency => frequency::extract(buffer, config),
        FeatureCategory::Spectral => spectral::extract(buffer, config),
        FeatureCategory::Rhythm => rhythm::extract(buffer, config),
    };
    if let Ok(values) = &result {
        tracing::debug!("Extracted {} {} features", values.len(), category);
    }
    result
}

/// Mean and population standard deviation as feature values
pub(crate) fn mean_std(values: &[f32]) -> (FeatureValue, FeatureValue) {
    if values.is_empty() {
        return (FeatureValue::Undefined, FeatureValue::Undefined);
    }
    (
        crate::dsp::stats::mean(values).into(),
        crate::dsp::stats::std_dev(values).into(),
    )
}
