// src/fetch/mod.rs
pub mod file;
pub mod http;
pub mod push;

pub use file::FileSource;
pub use http::HttpSource;

use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::table::{RecordTable, Value};

/// One raw record as delivered by the document store.
pub type Document = Map<String, JsonValue>;

/// Identity column the store adds to every document.
pub const ID_COLUMN: &str = "_id";
/// Sentinel the sensors use for "no reading".
pub const NA_TOKEN: &str = "na";

/// A flat read-only collection of documents.
pub trait RecordSource {
    /// Human-readable address, used in logs and errors.
    fn location(&self) -> String;

    /// Every document of the configured collection, in store order.
    fn fetch_documents(&self) -> Result<Vec<Document>>;
}

/// Fixed documents, for tests and callers that already hold the data.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: Vec<Document>,
}

impl MemorySource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

impl RecordSource for MemorySource {
    fn location(&self) -> String {
        format!("memory ({} documents)", self.documents.len())
    }

    fn fetch_documents(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Pick a source implementation from the URI scheme.
pub fn open_source(cfg: &SourceConfig) -> Result<Box<dyn RecordSource>> {
    let uri = cfg.uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let base = Url::parse(uri)
            .map_err(|e| PipelineError::InvalidConfig(format!("source.uri `{}`: {}", uri, e)))?;
        let source = HttpSource::new(
            base,
            &cfg.database,
            &cfg.collection,
            Duration::from_secs(cfg.timeout_secs),
        )?;
        return Ok(Box::new(source));
    }

    let root = if uri.starts_with("file://") {
        Url::parse(uri)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| PipelineError::InvalidConfig(format!("source.uri `{}` is not a file URL", uri)))?
    } else {
        PathBuf::from(uri)
    };
    Ok(Box::new(FileSource::new(root, &cfg.database, &cfg.collection)))
}

/// Flatten documents into a table: drop `_id`, turn `"na"` into null,
/// and require every document to carry the same keys as the first.
pub fn documents_to_table(documents: Vec<Document>) -> Result<RecordTable> {
    let Some(first) = documents.first() else {
        info!("source returned no documents");
        return RecordTable::new(Vec::new(), Vec::new());
    };
    let columns: Vec<String> = first
        .keys()
        .filter(|k| k.as_str() != ID_COLUMN)
        .cloned()
        .collect();

    let mut rows = Vec::with_capacity(documents.len());
    for (index, mut doc) in documents.into_iter().enumerate() {
        doc.remove(ID_COLUMN);
        if doc.len() != columns.len() {
            return Err(PipelineError::MalformedRecord {
                index,
                reason: format!("{} fields, expected {}", doc.len(), columns.len()),
            });
        }
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            let raw = doc.remove(column).ok_or_else(|| PipelineError::MalformedRecord {
                index,
                reason: format!("missing field `{}`", column),
            })?;
            row.push(json_to_value(index, column, raw)?);
        }
        rows.push(row);
    }
    debug!(columns = columns.len(), rows = rows.len(), "flattened documents");
    RecordTable::new(columns, rows)
}

fn json_to_value(index: usize, column: &str, raw: JsonValue) -> Result<Value> {
    Ok(match raw {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Text(b.to_string()),
        JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        JsonValue::String(s) if s == NA_TOKEN => Value::Null,
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            return Err(PipelineError::MalformedRecord {
                index,
                reason: format!("field `{}` is not a scalar", column),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: JsonValue) -> Document {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn drops_identity_and_normalizes_na() {
        let docs = vec![
            doc(json!({"_id": {"$oid": "1"}, "From Date": "01-01-2020 00:00", "PM2.5": 10.5, "NO2": "na"})),
            doc(json!({"_id": {"$oid": "2"}, "From Date": "01-01-2020 01:00", "PM2.5": null, "NO2": "7"})),
        ];
        let t = documents_to_table(docs).unwrap();
        assert_eq!(t.columns(), ["From Date", "PM2.5", "NO2"]);
        assert_eq!(t.rows()[0][2], Value::Null);
        assert_eq!(t.rows()[0][1], Value::Number(10.5));
        assert_eq!(t.rows()[1][1], Value::Null);
        assert_eq!(t.rows()[1][2], Value::Text("7".into()));
    }

    #[test]
    fn inconsistent_fields_are_malformed() {
        let docs = vec![
            doc(json!({"a": 1, "b": 2})),
            doc(json!({"a": 1, "c": 2})),
        ];
        assert!(matches!(
            documents_to_table(docs),
            Err(PipelineError::MalformedRecord { index: 1, .. })
        ));
    }

    #[test]
    fn nested_values_are_malformed() {
        let docs = vec![doc(json!({"a": [1, 2]}))];
        assert!(matches!(
            documents_to_table(docs),
            Err(PipelineError::MalformedRecord { index: 0, .. })
        ));
    }

    #[test]
    fn scheme_selects_source() {
        let mut cfg = SourceConfig::default();
        cfg.uri = "https://store.example/api".into();
        assert!(open_source(&cfg).unwrap().location().starts_with("https://store.example/api"));

        cfg.uri = "dumps".into();
        let loc = open_source(&cfg).unwrap().location();
        assert!(loc.ends_with("air_quality.json"), "{}", loc);
    }
}
