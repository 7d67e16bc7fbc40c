// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by the wrapping variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("record source `{location}` is unavailable: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("insufficient data for {operation}: {rows} rows, need at least {required}")]
    InsufficientData {
        operation: &'static str,
        rows: usize,
        required: usize,
    },

    #[error("failed to load schema from {origin}: {source}")]
    SchemaLoad {
        origin: String,
        #[source]
        source: BoxError,
    },

    #[error("{split} table has {found} columns, schema expects {expected}")]
    SchemaMismatch {
        split: String,
        expected: usize,
        found: usize,
    },

    #[error("KS test undefined for column `{column}`: {reason}")]
    StatTest { column: String, reason: String },

    #[error("cannot parse table {path:?}: {source}")]
    FileFormat {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("row {row}: `{value}` in column `{column}` does not match format `{format}`")]
    TimestampParse {
        column: String,
        row: usize,
        value: String,
        format: String,
    },

    #[error("column `{column}` is missing ({context})")]
    MissingColumn { column: String, context: String },

    #[error("preprocessing failed while {operation}: {source}")]
    Preprocessing {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("imputation failed while {operation}: {source}")]
    Imputation {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn preprocessing(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::Preprocessing {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub(crate) fn imputation(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::Imputation {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
