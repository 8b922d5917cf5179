use std::f32::consts::PI;
use std::io::Cursor;

use motor_audio_analyzer::audio::{AudioBuffer, AudioFormat, AudioLoader};
use motor_audio_analyzer::config::{AudioConfig, Config};
use motor_audio_analyzer::error::{AnalyzerError, AudioError, TransformError};
use motor_audio_analyzer::export;
use motor_audio_analyzer::features::{catalog, FeatureValue};
use motor_audio_analyzer::pipeline::{AnalysisEngine, AnalysisOptions, AnalysisRecord};
use motor_audio_analyzer::TransformKind;

const RATE: u32 = 22050;

fn engine() -> AnalysisEngine {
    let mut config = Config::default();
    config.render.width = 120;
    config.render.height = 80;
    AnalysisEngine::new(config).unwrap()
}

fn sine(freq: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / RATE as f32).sin())
        .collect()
}

fn analyze(samples: Vec<f32>) -> AnalysisRecord {
    let buffer = AudioBuffer::new(samples, RATE).unwrap();
    engine()
        .analyze("test.wav", &buffer, &AnalysisOptions::default())
        .unwrap()
}

fn wav_bytes(samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[test]
fn silent_input() {
    let record = analyze(vec![0.0; RATE as usize * 2]);
    let features = &record.features;

    assert_eq!(features.value("rms_energy_mean"), Some(0.0));
    assert_eq!(features.value("zero_crossing_rate_mean"), Some(0.0));
    assert_eq!(features.get("crest_factor"), Some(FeatureValue::Undefined));
    assert_eq!(features.get("spectral_centroid"), Some(FeatureValue::Undefined));
    assert_eq!(features.get("tempo"), Some(FeatureValue::Undefined));
    assert!(!features.failures().is_empty());
}

#[test]
fn sine_centroid_and_rolloff_within_one_bin() {
    let bin_width = RATE as f64 / 2048.0;
    for freq in [500.0f32, 1500.0, 3000.0] {
        let record = analyze(sine(freq, RATE as usize * 2));
        let centroid = record.features.value("spectral_centroid").unwrap();
        let rolloff = record.features.value("spectral_rolloff").unwrap();
        assert!((centroid - freq as f64).abs() < bin_width, "{} Hz centroid {}", freq, centroid);
        assert!((rolloff - freq as f64).abs() < bin_width, "{} Hz rolloff {}", freq, rolloff);
    }
}

#[test]
fn images_match_matrices() {
    let record = analyze(sine(440.0, RATE as usize * 2));
    assert_eq!(record.spectrograms.len(), 6);

    for spectrogram in &record.spectrograms {
        assert_eq!(spectrogram.matrix().is_some(), spectrogram.image().is_some());
        assert_eq!(spectrogram.matrix().is_some(), spectrogram.error().is_none());

        let matrix = spectrogram.matrix().unwrap();
        assert!(matrix.data().iter().all(|v| v.is_finite()));

        let image = spectrogram.image().unwrap();
        let decoded = image::load_from_memory_with_format(image.png(), image::ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }
}

#[test]
fn short_input_fails_only_kurtosis() {
    let record = analyze(sine(440.0, 1000));

    for spectrogram in &record.spectrograms {
        if spectrogram.kind == TransformKind::Kurtosis {
            assert!(matches!(
                spectrogram.error(),
                Some(TransformError::InsufficientFrames { .. })
            ));
            assert!(spectrogram.image().is_none());
        } else {
            assert!(
                spectrogram.is_rendered(),
                "{} failed: {:?}",
                spectrogram.key(),
                spectrogram.error()
            );
        }
    }
}

#[test]
fn analysis_is_deterministic() {
    let samples: Vec<f32> = sine(300.0, RATE as usize * 2)
        .iter()
        .zip(sine(2300.0, RATE as usize * 2))
        .map(|(a, b)| a + 0.3 * b)
        .collect();

    let first = analyze(samples.clone());
    let second = analyze(samples);
    assert_eq!(first.spectrograms, second.spectrograms);
    assert_eq!(first.features, second.features);
}

#[test]
fn every_feature_is_catalogued_once() {
    let record = analyze(sine(440.0, RATE as usize * 2));
    assert_eq!(record.features.len(), catalog::len());
    for feature in record.features.iter() {
        assert_eq!(catalog::category_of(&feature.name), Some(feature.category));
    }
}

#[test]
fn exports_round_trip() {
    let record = analyze(sine(880.0, RATE as usize * 2));
    let csv = export::features_to_csv(&record.features);
    let json: serde_json::Value = serde_json::from_str(&export::record_to_json(&record).unwrap()).unwrap();

    for line in csv.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        let name = fields[0];
        let from_json = json["features"][name]["value"].as_f64();
        let from_csv = if fields[2].is_empty() {
            None
        } else {
            Some(fields[2].parse::<f64>().unwrap())
        };
        let original = record.features.value(name);

        match (original, from_csv, from_json) {
            (Some(v), Some(c), Some(j)) => {
                assert!((v - c).abs() <= 1e-9 * v.abs().max(1.0), "{}", name);
                assert!((v - j).abs() <= 1e-9 * v.abs().max(1.0), "{}", name);
            }
            (None, None, None) => {}
            other => panic!("{} disagrees across exports: {:?}", name, other),
        }
    }
    assert_eq!(json["spectrograms"].as_object().unwrap().len(), 6);
}

#[test]
fn duration_ceiling_is_inclusive() {
    let config = AudioConfig {
        max_duration_secs: 1.0,
        ..AudioConfig::default()
    };

    let at_limit = wav_bytes(&sine(440.0, RATE as usize));
    let buffer = AudioLoader::decode(&at_limit, AudioFormat::Wav, &config).unwrap();
    assert_eq!(buffer.len(), RATE as usize);

    let over_limit = wav_bytes(&sine(440.0, RATE as usize + 1));
    assert!(matches!(
        AudioLoader::decode(&over_limit, AudioFormat::Wav, &config),
        Err(AudioError::DurationExceeded { .. })
    ));
}

#[test]
fn decode_failure_is_fatal() {
    let engine = engine();
    let result = engine.analyze_bytes("broken.wav", b"not audio", AudioFormat::Wav, &AnalysisOptions::default());
    match result {
        Err(error @ AnalyzerError::Audio(_)) => assert!(error.is_rejection()),
        other => panic!("expected a decode failure, got {:?}", other.map(|r| r.filename)),
    }
}

#[test]
fn cancelled_transforms_are_recorded() {
    let engine = engine();
    let bytes = wav_bytes(&sine(440.0, RATE as usize));
    let options = AnalysisOptions::default();
    options.cancel.cancel();

    let record = engine.analyze_bytes("tone.wav", &bytes, AudioFormat::Wav, &options).unwrap();
    assert_eq!(record.rendered_count(), 0);
    assert_eq!(record.failed_transforms().count(), 6);
    assert!(record
        .failed_transforms()
        .all(|(_, error)| *error == TransformError::Cancelled));
}

#[tokio::test]
async fn analyzes_a_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Pump.WAV");
    tokio::fs::write(&path, wav_bytes(&sine(440.0, RATE as usize)))
        .await
        .unwrap();

    let format = AudioFormat::from_path(&path).unwrap();
    assert_eq!(format, AudioFormat::Wav);
    let bytes = tokio::fs::read(&path).await.unwrap();

    let record = tokio::task::spawn_blocking(move || {
        engine().analyze_bytes("Pump.WAV", &bytes, format, &AnalysisOptions::default())
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(record.filename, "Pump.WAV");
    assert_eq!(record.sample_rate, RATE);
    assert!((record.duration - 1.0).abs() < 1e-9);
    assert_eq!(record.rendered_count(), 6);
}
