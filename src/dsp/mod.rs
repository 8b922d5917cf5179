//! Numerical building blocks shared by the transforms and feature groups.

pub mod filters;
pub mod matrix;
pub mod scale;
pub mod stats;
pub mod stft;

pub use matrix::Matrix;
pub use scale::DbReference;
pub use stft::{FrameGeometry, Framing, Stft, REFERENCE_SAMPLE_RATE};
