//! # Result Aggregator
//!
//! Runs the six transforms and four feature groups over one
//! [`AudioBuffer`](crate::audio::AudioBuffer) on a dedicated thread pool and
//! joins their outputs into an immutable [`AnalysisRecord`].
//!
//! ```rust,no_run
//! use motor_audio_analyzer::audio::AudioFormat;
//! use motor_audio_analyzer::config::Config;
//! use motor_audio_analyzer::pipeline::{AnalysisEngine, AnalysisOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = AnalysisEngine::new(Config::default())?;
//! let bytes = std::fs::read("motor.wav")?;
//! let record = engine.analyze_bytes("motor.wav", &bytes, AudioFormat::Wav, &AnalysisOptions::default())?;
//! println!("{} features", record.features.len());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod engine;
pub mod record;

pub use cancel::CancelToken;
pub use engine::{AnalysisEngine, AnalysisOptions};
pub use record::{AnalysisRecord, SpectrogramOutcome, SpectrogramResult};
