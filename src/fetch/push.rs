// src/fetch/push.rs
//! Load a local CSV export into the file-backed document store.

use serde_json::{Number, Value as JsonValue};
use std::path::Path;
use tracing::info;

use super::{file::collection_path, Document};
use crate::error::{PipelineError, Result};
use crate::persist::write_atomic;
use crate::table::{read_csv, Value};

/// One JSON object per CSV row: numbers stay numbers, empty cells become null.
pub fn csv_to_documents<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let table = read_csv(path)?;
    let docs = table
        .rows()
        .iter()
        .map(|row| {
            table
                .columns()
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.clone(), cell_to_json(cell)))
                .collect::<Document>()
        })
        .collect();
    Ok(docs)
}

fn cell_to_json(cell: &Value) -> JsonValue {
    match cell {
        Value::Null => JsonValue::Null,
        Value::Text(s) => match cell.as_f64().and_then(Number::from_f64) {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::String(s.clone()),
        },
        Value::Number(n) => Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
    }
}

/// Replace the collection dump under `root` with `documents`; returns how many were written.
pub fn insert_documents(
    root: impl AsRef<Path>,
    database: &str,
    collection: &str,
    documents: &[Document],
) -> Result<usize> {
    let path = collection_path(root, database, collection);
    write_atomic(&path, |out| {
        serde_json::to_writer(&mut *out, documents).map_err(|e| PipelineError::Io {
            operation: "serializing documents",
            path: path.clone(),
            source: e.into(),
        })
    })?;
    info!(path = %path.display(), documents = documents.len(), "records inserted");
    Ok(documents.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{documents_to_table, FileSource, RecordSource};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pushed_csv_reads_back_through_file_source() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("raw.csv");
        fs::write(
            &csv_path,
            "From Date,To Date,PM2.5,NO2\n01-01-2020 00:00,01-01-2020 01:00,12.50,na\n01-01-2020 01:00,01-01-2020 02:00,,3\n",
        )
        .unwrap();

        let docs = csv_to_documents(&csv_path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["PM2.5"], JsonValue::Null);
        assert_eq!(docs[0]["PM2.5"], serde_json::json!(12.5));

        let root = dir.path().join("store");
        assert_eq!(insert_documents(&root, "db", "coll", &docs).unwrap(), 2);

        let fetched = FileSource::new(&root, "db", "coll").fetch_documents().unwrap();
        let table = documents_to_table(fetched).unwrap();
        assert_eq!(table.columns(), ["From Date", "To Date", "PM2.5", "NO2"]);
        assert_eq!(table.rows()[0][3], Value::Null);
        assert_eq!(table.rows()[1][3], Value::Number(3.0));
    }
}
