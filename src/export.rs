//! Serialization of analysis results for downstream consumers.
//!
//! JSON keeps the transform order and the catalog order of features;
//! undefined values are `null`. CSV has one row per feature with the columns
//! `feature,category,value`, and undefined values are left empty.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::Result;
use crate::features::{FeatureCategory, FeatureSet, FeatureValue, GroupFailure};
use crate::pipeline::{AnalysisRecord, SpectrogramResult};

pub const CSV_HEADER: &str = "feature,category,value";

#[derive(Serialize)]
struct RecordView<'a> {
    filename: &'a str,
    sample_rate: u32,
    duration: f64,
    timestamp: &'a DateTime<Utc>,
    spectrograms: SpectrogramMap<'a>,
    features: FeatureMap<'a>,
    annotations: &'a [GroupFailure],
}

struct SpectrogramMap<'a>(&'a [SpectrogramResult]);

#[derive(Serialize)]
struct SpectrogramEntry {
    name: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<[usize; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&SpectrogramResult> for SpectrogramEntry {
    fn from(result: &SpectrogramResult) -> Self {
        Self {
            name: result.display_name(),
            status: if result.is_rendered() { "ok" } else { "error" },
            shape: result.matrix().map(|m| [m.rows(), m.cols()]),
            error: result.error().map(ToString::to_string),
        }
    }
}

impl Serialize for SpectrogramMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(result.key(), &SpectrogramEntry::from(result))?;
        }
        map.end()
    }
}

/// `name -> { category, value }` in catalog order
struct FeatureMap<'a>(&'a FeatureSet);

#[derive(Serialize)]
struct FeatureEntry {
    category: FeatureCategory,
    value: FeatureValue,
}

impl Serialize for FeatureMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for feature in self.0.iter() {
            let entry = FeatureEntry {
                category: feature.category,
                value: feature.value,
            };
            map.serialize_entry(&feature.name, &entry)?;
        }
        map.end()
    }
}

/// `name -> value` in catalog order
struct FeatureValues<'a>(&'a FeatureSet);

impl Serialize for FeatureValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for feature in self.0.iter() {
            map.serialize_entry(&feature.name, &feature.value)?;
        }
        map.end()
    }
}

/// Pretty-printed JSON for a whole record; matrices and images are left out
pub fn record_to_json(record: &AnalysisRecord) -> Result<String> {
    let view = RecordView {
        filename: &record.filename,
        sample_rate: record.sample_rate,
        duration: record.duration,
        timestamp: &record.timestamp,
        spectrograms: SpectrogramMap(&record.spectrograms),
        features: FeatureMap(&record.features),
        annotations: record.features.failures(),
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

/// Flat `{ name: value }` object
pub fn features_to_json(features: &FeatureSet) -> Result<String> {
    Ok(serde_json::to_string_pretty(&FeatureValues(features))?)
}

pub fn features_to_csv(features: &FeatureSet) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for feature in features.iter() {
        let value = feature.value.as_f64().map(|v| v.to_string()).unwrap_or_default();
        csv.push_str(&format!("{},{},{}\n", feature.name, feature.category, value));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Matrix;
    use crate::error::{FeatureError, TransformError};
    use crate::pipeline::SpectrogramOutcome;
    use crate::render::{render, Colormap, Normalization, RenderStyle};
    use crate::transforms::TransformKind;

    fn sample_record() -> AnalysisRecord {
        let matrix = Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
        let style = RenderStyle {
            colormap: Colormap::Viridis,
            normalization: Normalization::MinMax,
        };
        let image = render(&matrix, &style, 8, 8).unwrap();

        AnalysisRecord {
            filename: "pump.wav".to_string(),
            sample_rate: 22050,
            duration: 1.5,
            timestamp: Utc::now(),
            spectrograms: vec![
                SpectrogramResult {
                    kind: TransformKind::Mel,
                    outcome: SpectrogramOutcome::Rendered { matrix, image },
                },
                SpectrogramResult {
                    kind: TransformKind::Cqt,
                    outcome: SpectrogramOutcome::Failed(TransformError::InsufficientSamples {
                        available: 10,
                        required: 256,
                    }),
                },
            ],
            features: FeatureSet::assemble(vec![
                (
                    FeatureCategory::Time,
                    Ok(vec![
                        ("rms_energy_mean".to_string(), FeatureValue::Defined(0.123456789)),
                        ("peak_amplitude".to_string(), FeatureValue::Defined(1.0)),
                    ]
                    .into()),
                ),
                (FeatureCategory::Rhythm, Err(FeatureError::Silent)),
            ]),
        }
    }

    #[test]
    fn test_record_json_shape() {
        let record = sample_record();
        let json = record_to_json(&record).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["filename"], "pump.wav");
        assert_eq!(parsed["spectrograms"]["mel_spectrogram"]["status"], "ok");
        assert_eq!(parsed["spectrograms"]["mel_spectrogram"]["shape"], serde_json::json!([2, 2]));
        assert_eq!(parsed["spectrograms"]["cqt"]["status"], "error");
        assert!(parsed["spectrograms"]["cqt"]["error"]
            .as_str()
            .unwrap()
            .contains("insufficient samples"));

        assert_eq!(parsed["features"]["peak_amplitude"]["category"], "time");
        assert!(parsed["features"]["tempo"]["value"].is_null());
        assert_eq!(parsed["annotations"][0]["category"], "rhythm");
        assert_eq!(parsed["annotations"][0]["reason"], "signal is silent");
    }

    #[test]
    fn test_json_keeps_transform_order() {
        let json = record_to_json(&sample_record()).unwrap();
        let mel = json.find("mel_spectrogram").unwrap();
        let cqt = json.find("\"cqt\"").unwrap();
        assert!(mel < cqt);
    }

    #[test]
    fn test_csv_and_json_agree() {
        let record = sample_record();
        let csv = features_to_csv(&record.features);
        let json: serde_json::Value = serde_json::from_str(&features_to_json(&record.features).unwrap()).unwrap();

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));

        let mut rows = 0;
        for line in lines {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3);
            let (name, category, value) = (fields[0], fields[1], fields[2]);

            let feature = record.features.iter().find(|f| f.name == name).unwrap();
            assert_eq!(category, feature.category.as_str());

            match feature.value.as_f64() {
                Some(expected) => {
                    assert!((value.parse::<f64>().unwrap() - expected).abs() < 1e-12);
                    assert!((json[name].as_f64().unwrap() - expected).abs() < 1e-12);
                }
                None => {
                    assert_eq!(value, "");
                    assert!(json[name].is_null());
                }
            }
            rows += 1;
        }
        assert_eq!(rows, record.features.len());
    }
}
