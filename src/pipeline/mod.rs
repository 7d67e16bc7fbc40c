// src/pipeline/mod.rs
//! Ingestion → validation → transformation, run in order over one run directory.

pub mod ingestion;
pub mod preprocess;
pub mod transformation;
pub mod validation;

pub use ingestion::Ingestor;
pub use transformation::Transformer;
pub use validation::{DriftReport, Validator};

use glob::glob;
use std::{fmt, path::PathBuf, time::Instant};
use tracing::{error, info};

use crate::artifact::{IngestionArtifact, StageArtifact, TransformationArtifact, ValidationArtifact};
use crate::config::{PipelineConfig, RunLayout};
use crate::error::{PipelineError, Result};
use crate::fetch::RecordSource;

/// Artifacts of a run that completed every stage.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_dir: PathBuf,
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub transformation: TransformationArtifact,
}

/// A failed run: the error plus whatever the last successful stage produced.
#[derive(Debug)]
pub struct PipelineFailure {
    pub last_artifact: Option<StageArtifact>,
    pub error: PipelineError,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_artifact {
            Some(StageArtifact::Ingestion(_)) => write!(f, "validation failed: {}", self.error),
            Some(StageArtifact::Validation(_)) => write!(f, "transformation failed: {}", self.error),
            Some(StageArtifact::Transformation(_)) => write!(f, "pipeline failed: {}", self.error),
            None => write!(f, "ingestion failed: {}", self.error),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drives the three stages over a single [`RunLayout`].
pub struct TrainingPipeline {
    config: PipelineConfig,
    layout: RunLayout,
    source: Box<dyn RecordSource>,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, source: Box<dyn RecordSource>) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            source,
        }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Run every stage in order; stops at the first failure.
    pub fn run(self) -> std::result::Result<PipelineOutcome, PipelineFailure> {
        let start = Instant::now();
        let fail = |last_artifact: Option<StageArtifact>| {
            move |error: PipelineError| {
                error!(error = %error, "pipeline stage failed");
                PipelineFailure {
                    last_artifact,
                    error,
                }
            }
        };

        // every stage is configured before any data moves, so a bad schema fails fast
        let TrainingPipeline {
            config,
            layout,
            source,
        } = self;
        config.validate().map_err(fail(None))?;
        let validator = Validator::new(&config, layout.validation.clone()).map_err(fail(None))?;
        let ingestor = Ingestor::new(source, &config.ingestion, layout.ingestion.clone());
        let transformer = Transformer::new(config.transformation.clone(), layout.transformation.clone());
        info!(
            pipeline = %config.pipeline_name,
            run_dir = %layout.run_dir.display(),
            seed = ingestor.seed(),
            "starting run"
        );

        let ingestion = ingestor.run().map_err(fail(None))?;
        info!("{}", ingestion);

        let last = Some(StageArtifact::Ingestion(ingestion.clone()));
        let validation = validator.run(&ingestion).map_err(fail(last))?;
        info!("{}", validation);
        if !validation.validation_status {
            info!("drift detected between train and test; continuing");
        }

        let last = Some(StageArtifact::Validation(validation.clone()));
        let transformation = transformer.run(&validation).map_err(fail(last))?;
        info!("{}", transformation);

        info!(elapsed = ?start.elapsed(), "run complete");
        Ok(PipelineOutcome {
            run_dir: layout.run_dir,
            ingestion,
            validation,
            transformation,
        })
    }
}

/// Most recently written drift report under `config.artifact_dir`, if any run got that far.
pub fn latest_drift_report(config: &PipelineConfig) -> Result<Option<PathBuf>> {
    let pattern = config
        .artifact_dir
        .join("*")
        .join("data_validation")
        .join("drift_report")
        .join(&config.validation.drift_report_file_name);
    let pattern = pattern.to_string_lossy();
    let entries = glob(&pattern)
        .map_err(|e| PipelineError::InvalidConfig(format!("bad artifact pattern {}: {}", pattern, e)))?;

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for path in entries.filter_map(|e| e.ok()) {
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| PipelineError::io("reading metadata", &path, e))?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}
