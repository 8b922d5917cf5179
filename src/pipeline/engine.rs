use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioFormat, AudioLoader};
use crate::config::{Config, PipelineConfig};
use crate::error::{AnalyzerError, AudioError, Result};
use crate::features::{self, FeatureCategory, FeatureSet};
use crate::pipeline::record::{AnalysisRecord, SpectrogramOutcome, SpectrogramResult};
use crate::pipeline::CancelToken;
use crate::render::{render, RenderStyle};
use crate::transforms::Transform;

/// Per-request knobs that are not part of the persistent configuration
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Shared with the caller so it can abort the analysis
    pub cancel: CancelToken,
    /// Overrides `pipeline.deadline_ms` for this request
    pub deadline: Option<Duration>,
}

impl AnalysisOptions {
    fn token(&self, config: &PipelineConfig) -> CancelToken {
        let deadline = self
            .deadline
            .or_else(|| config.deadline_ms.map(Duration::from_millis));
        match deadline {
            Some(timeout) => self.cancel.clone().with_deadline(timeout),
            None => self.cancel.clone(),
        }
    }
}

/// Main analysis engine that fans one recording out to every transform and
/// feature group.
///
/// The pipeline per request:
/// 1. Decode - bytes to a mono, resampled, normalized buffer (fatal on failure)
/// 2. Transforms - six matrices computed and rendered in parallel
/// 3. Features - four groups computed side by side
/// 4. Assembly - one [`AnalysisRecord`] with a UTC timestamp
pub struct AnalysisEngine {
    config: Config,
    pool: ThreadPool,
}

impl AnalysisEngine {
    /// Validate `config` and start its worker pool
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.pipeline.worker_threads)
            .thread_name(|index| format!("analysis-worker-{}", index))
            .build()
            .map_err(|e| AnalyzerError::generic(format!("Failed to start worker pool: {}", e)))?;

        debug!("Analysis pool ready with {} threads", config.pipeline.worker_threads);
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decode `bytes` and analyse them.
    ///
    /// Only decoding can fail; transform and feature failures are recorded
    /// inside the returned record.
    pub fn analyze_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
        format: AudioFormat,
        options: &AnalysisOptions,
    ) -> Result<AnalysisRecord> {
        info!("🎵 Decoding {} ({} bytes, {})", filename, bytes.len(), format);
        let buffer = AudioLoader::decode(bytes, format, &self.config.audio).map_err(|e| {
            warn!("Failed to decode {}: {}", filename, e);
            AnalyzerError::from(e)
        })?;

        self.analyze(filename, &buffer, options)
    }

    /// Run every transform and feature group over an already decoded buffer.
    ///
    /// Buffers longer than `audio.max_duration_secs` are rejected before
    /// any work starts.
    pub fn analyze(&self, filename: &str, buffer: &AudioBuffer, options: &AnalysisOptions) -> Result<AnalysisRecord> {
        let limit = self.config.audio.max_duration_secs;
        if buffer.len() > self.config.audio.max_samples(buffer.sample_rate()) {
            warn!("Rejecting {}: {:.2}s exceeds {:.2}s", filename, buffer.duration(), limit);
            return Err(AudioError::DurationExceeded {
                duration: buffer.duration(),
                limit,
            }
            .into());
        }

        let cancel = options.token(&self.config.pipeline);
        let started = Instant::now();
        info!(
            "🔬 Analysing {}: {:.2}s at {} Hz",
            filename,
            buffer.duration(),
            buffer.sample_rate()
        );

        let (spectrograms, features) = self.pool.install(|| {
            rayon::join(
                || self.run_transforms(buffer, &cancel),
                || self.run_features(buffer),
            )
        });

        let record = AnalysisRecord {
            filename: filename.to_string(),
            sample_rate: buffer.sample_rate(),
            duration: buffer.duration(),
            timestamp: Utc::now(),
            spectrograms,
            features,
        };

        info!(
            "✅ Analysis of {} complete in {:.2?}: {}/{} spectrograms, {}/{} features defined",
            filename,
            started.elapsed(),
            record.rendered_count(),
            record.spectrograms.len(),
            record.features.defined_count(),
            record.features.len()
        );
        Ok(record)
    }

    // ==========================================
    // TRANSFORMS
    // ==========================================

    fn run_transforms(&self, buffer: &AudioBuffer, cancel: &CancelToken) -> Vec<SpectrogramResult> {
        self.config
            .transforms
            .transforms()
            .par_iter()
            .map(|transform| self.run_transform(transform, buffer, cancel))
            .collect()
    }

    /// Compute one matrix and render it straight away
    fn run_transform(&self, transform: &Transform, buffer: &AudioBuffer, cancel: &CancelToken) -> SpectrogramResult {
        let kind = transform.kind();
        let started = Instant::now();

        let outcome = transform
            .compute(buffer, cancel)
            .and_then(|matrix| {
                let style = RenderStyle::for_kind(kind, &self.config.render);
                let image = render(&matrix, &style, self.config.render.width, self.config.render.height)?;
                Ok(SpectrogramOutcome::Rendered { matrix, image })
            })
            .unwrap_or_else(|error| {
                warn!("{} unavailable: {}", kind.display_name(), error);
                SpectrogramOutcome::Failed(error)
            });

        if let SpectrogramOutcome::Rendered { matrix, .. } = &outcome {
            debug!(
                "{} computed: {}x{} in {:.2?}",
                kind.display_name(),
                matrix.rows(),
                matrix.cols(),
                started.elapsed()
            );
        }
        SpectrogramResult { kind, outcome }
    }

    // ==========================================
    // FEATURES
    // ==========================================

    fn run_features(&self, buffer: &AudioBuffer) -> FeatureSet {
        let config = &self.config.features;
        let extract = |category| (category, features::extract(category, buffer, config));

        let ((time, frequency), (spectral, rhythm)) = rayon::join(
            || rayon::join(|| extract(FeatureCategory::Time), || extract(FeatureCategory::Frequency)),
            || rayon::join(|| extract(FeatureCategory::Spectral), || extract(FeatureCategory::Rhythm)),
        );

        FeatureSet::assemble(vec![time, frequency, spectral, rhythm])
    }
}
