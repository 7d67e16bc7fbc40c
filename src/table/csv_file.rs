// src/table/csv_file.rs
use csv::{ReaderBuilder, WriterBuilder};
use std::{fs::File, path::Path};
use tracing::debug;

use super::{RecordTable, Value};
use crate::error::{PipelineError, Result};
use crate::persist::write_atomic;

/// Load a headered CSV written by [`write_csv`] (or any comma-separated UTF-8 file).
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<RecordTable> {
    let path = path.as_ref();
    let format_err = |e: csv::Error| PipelineError::FileFormat {
        path: path.to_path_buf(),
        source: Box::new(e),
    };

    let file = File::open(path).map_err(|e| PipelineError::FileFormat {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let columns: Vec<String> = rdr
        .headers()
        .map_err(format_err)?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if columns.is_empty() {
        return Err(PipelineError::FileFormat {
            path: path.to_path_buf(),
            source: "missing header row".into(),
        });
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(format_err)?;
        rows.push(record.iter().map(Value::from_cell).collect());
    }
    debug!(path = %path.display(), rows = rows.len(), "read table");

    RecordTable::new(columns, rows).map_err(|e| PipelineError::FileFormat {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// Persist `table` as CSV (header row, nulls as empty cells), replacing any previous file.
pub fn write_csv<P: AsRef<Path>>(path: P, table: &RecordTable) -> Result<()> {
    let path = path.as_ref();
    let to_err = |e: csv::Error| PipelineError::FileFormat {
        path: path.to_path_buf(),
        source: Box::new(e),
    };

    write_atomic(path, |out| {
        if table.columns().is_empty() {
            return Ok(());
        }
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
        wtr.write_record(table.columns()).map_err(to_err)?;
        for row in table.rows() {
            wtr.write_record(row.iter().map(|v| v.to_string()))
                .map_err(to_err)?;
        }
        wtr.flush()
            .map_err(|e| PipelineError::io("flushing csv", path, e))?;
        Ok(())
    })?;
    debug!(path = %path.display(), rows = table.len(), "wrote table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn nulls_survive_a_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep/dir/t.csv");
        let table = RecordTable::new(
            vec!["From Date".into(), "PM2.5".into()],
            vec![
                vec![Value::Text("01-01-2020 00:00".into()), Value::Number(12.5)],
                vec![Value::Text("01-01-2020, late".into()), Value::Null],
            ],
        )
        .unwrap();

        write_csv(&path, &table).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("From Date,PM2.5\n"));
        assert!(text.contains("\"01-01-2020, late\",\n"));

        let back = read_csv(&path).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn rewrite_keeps_cell_spelling() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.csv");
        let dst = dir.path().join("out.csv");
        let text = "x,y\n007,NaN\n1.50,inf\n-2,\n";
        fs::write(&src, text).unwrap();

        write_csv(&dst, &read_csv(&src).unwrap()).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), text);
    }

    #[test]
    fn ragged_file_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        assert!(matches!(
            read_csv(&path),
            Err(PipelineError::FileFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_format_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_csv(dir.path().join("nope.csv")),
            Err(PipelineError::FileFormat { .. })
        ));
    }
}
