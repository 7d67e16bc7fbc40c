// src/fetch/file.rs
use serde_json::Value as JsonValue;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use super::{Document, RecordSource};
use crate::error::{PipelineError, Result};

/// A collection dump on disk: `<root>/<database>/<collection>.json` holding
/// either a JSON array of objects or one object per line.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(root: impl AsRef<Path>, database: &str, collection: &str) -> Self {
        Self {
            path: collection_path(root, database, collection),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where a collection lives under a dump root.
pub fn collection_path(root: impl AsRef<Path>, database: &str, collection: &str) -> PathBuf {
    root.as_ref()
        .join(database)
        .join(format!("{}.json", collection))
}

impl RecordSource for FileSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch_documents(&self) -> Result<Vec<Document>> {
        let unavailable = |source: crate::error::BoxError| PipelineError::SourceUnavailable {
            location: self.location(),
            source,
        };

        let text = fs::read_to_string(&self.path).map_err(|e| unavailable(Box::new(e)))?;
        let documents = parse_documents(&text).map_err(unavailable)?;
        info!(path = %self.path.display(), documents = documents.len(), "read collection dump");
        Ok(documents)
    }
}

/// Accept a JSON array or JSON lines; every entry must be an object.
pub(crate) fn parse_documents(text: &str) -> std::result::Result<Vec<Document>, crate::error::BoxError> {
    let trimmed = text.trim_start();
    let values: Vec<JsonValue> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            JsonValue::Object(map) => Ok(map),
            other => Err(format!("entry {} is not an object: {}", i, other).into()),
        })
        .collect()
}
