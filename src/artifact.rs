// src/artifact.rs
//! Immutable hand-off records between stages.

use serde::Serialize;
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionArtifact {
    pub feature_store_file_path: PathBuf,
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationArtifact {
    /// True when no column drifted between train and test.
    pub validation_status: bool,
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    /// Only set when some train rows were quarantined.
    pub invalid_train_file_path: Option<PathBuf>,
    pub invalid_test_file_path: Option<PathBuf>,
    pub drift_report_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub final_object_file_path: PathBuf,
}

/// Whichever artifact a run produced last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageArtifact {
    Ingestion(IngestionArtifact),
    Validation(ValidationArtifact),
    Transformation(TransformationArtifact),
}

fn write_json<T: Serialize>(f: &mut fmt::Formatter<'_>, name: &str, value: &T) -> fmt::Result {
    let body = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
    write!(f, "{} {}", name, body)
}

impl fmt::Display for IngestionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(f, "IngestionArtifact", self)
    }
}

impl fmt::Display for ValidationArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(f, "ValidationArtifact", self)
    }
}

impl fmt::Display for TransformationArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(f, "TransformationArtifact", self)
    }
}

impl fmt::Display for StageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageArtifact::Ingestion(a) => fmt::Display::fmt(a, f),
            StageArtifact::Validation(a) => fmt::Display::fmt(a, f),
            StageArtifact::Transformation(a) => fmt::Display::fmt(a, f),
        }
    }
}
