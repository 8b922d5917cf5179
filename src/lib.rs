//! # Motor Audio Analyzer
//!
//! Diagnostic spectral analysis of short motor-noise recordings.
//!
//! One recording is decoded into a mono buffer, then six time-frequency
//! views and four families of scalar descriptors are computed from it in
//! parallel. The views are rendered to PNG images and everything is
//! collected into a single [`AnalysisRecord`](pipeline::AnalysisRecord).
//! A transform or feature group that cannot cope with its input fails on
//! its own and leaves the rest of the analysis intact.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motor_audio_analyzer::{
//!     audio::AudioFormat,
//!     config::Config,
//!     export,
//!     pipeline::{AnalysisEngine, AnalysisOptions},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = AnalysisEngine::new(Config::default())?;
//! let bytes = std::fs::read("motor.wav")?;
//! let record = engine.analyze_bytes("motor.wav", &bytes, AudioFormat::Wav, &AnalysisOptions::default())?;
//!
//! for spectrogram in &record.spectrograms {
//!     match spectrogram.image() {
//!         Some(image) => std::fs::write(format!("{}.png", spectrogram.key()), image.png())?,
//!         None => eprintln!("{} failed", spectrogram.display_name()),
//!     }
//! }
//! println!("{}", export::features_to_csv(&record.features));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`audio`] - Decoding, downmixing, resampling and the duration gate
//! - [`transforms`] - Mel, CQT, log-STFT, wavelet, spectral kurtosis and modulation
//! - [`render`] - Colour-mapped PNG rendering of transform matrices
//! - [`features`] - Time, frequency, spectral and rhythm descriptors
//! - [`pipeline`] - Parallel execution and result assembly
//! - [`export`] - JSON and CSV output
//! - [`dsp`] - Shared numerical building blocks
//! - [`config`] - Configuration management

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod export;
pub mod features;
pub mod pipeline;
pub mod render;
pub mod transforms;

// Re-export commonly used types for convenience
pub use crate::{
    audio::{AudioBuffer, AudioFormat},
    config::Config,
    error::{AnalyzerError, Result},
    features::{FeatureSet, FeatureValue},
    pipeline::{AnalysisEngine, AnalysisOptions, AnalysisRecord},
    transforms::TransformKind,
};
