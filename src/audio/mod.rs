//! # Audio Loading Module
//!
//! Turns an uploaded recording into the single immutable [`AudioBuffer`]
//! every transform and feature group reads from.
//!
//! ## Steps
//!
//! - **Decode**: WAV through `hound`, MP3/FLAC/M4A through Symphonia
//! - **Downmix**: channels are averaged to mono
//! - **Resample**: to the configured analysis rate (22 050 Hz by default)
//! - **Normalize**: peak amplitude scaled to 1.0
//! - **Gate**: recordings longer than the duration ceiling are rejected
//!
//! ## Usage
//!
//! ```rust,no_run
//! use motor_audio_analyzer::audio::{AudioFormat, AudioLoader};
//! use motor_audio_analyzer::config::AudioConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let bytes = std::fs::read("motor.wav")?;
//! let buffer = AudioLoader::decode(&bytes, AudioFormat::Wav, &AudioConfig::default())?;
//! println!("{:.2}s at {} Hz", buffer.duration(), buffer.sample_rate());
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod resample;
pub mod types;

pub use loader::AudioLoader;
pub use types::{AudioBuffer, AudioFormat};
