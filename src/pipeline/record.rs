use chrono::{DateTime, Utc};

use crate::dsp::Matrix;
use crate::error::TransformError;
use crate::features::FeatureSet;
use crate::render::RenderedImage;
use crate::transforms::TransformKind;

/// A transform either produced a matrix and its image, or failed
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrogramOutcome {
    Rendered { matrix: Matrix, image: RenderedImage },
    Failed(TransformError),
}

/// Output of one transform generator
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramResult {
    pub kind: TransformKind,
    pub outcome: SpectrogramOutcome,
}

impl SpectrogramResult {
    pub fn key(&self) -> &'static str {
        self.kind.key()
    }

    pub fn display_name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn matrix(&self) -> Option<&Matrix> {
        match &self.outcome {
            SpectrogramOutcome::Rendered { matrix, .. } => Some(matrix),
            SpectrogramOutcome::Failed(_) => None,
        }
    }

    pub fn image(&self) -> Option<&RenderedImage> {
        match &self.outcome {
            SpectrogramOutcome::Rendered { image, .. } => Some(image),
            SpectrogramOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TransformError> {
        match &self.outcome {
            SpectrogramOutcome::Rendered { .. } => None,
            SpectrogramOutcome::Failed(error) => Some(error),
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.outcome, SpectrogramOutcome::Rendered { .. })
    }
}

/// Everything known about one analysed recording.
///
/// Spectrograms keep transform order; the first one is the default view.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub filename: String,
    pub sample_rate: u32,
    /// Seconds
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    pub spectrograms: Vec<SpectrogramResult>,
    pub features: FeatureSet,
}

impl AnalysisRecord {
    pub fn spectrogram(&self, kind: TransformKind) -> Option<&SpectrogramResult> {
        self.spectrograms.iter().find(|s| s.kind == kind)
    }

    pub fn rendered_count(&self) -> usize {
        self.spectrograms.iter().filter(|s| s.is_rendered()).count()
    }

    /// Transforms that failed, with their reasons
    pub fn failed_transforms(&self) -> impl Iterator<Item = (&SpectrogramResult, &TransformError)> {
        self.spectrograms
            .iter()
            .filter_map(|s| s.error().map(|error| (s, error)))
    }
}
