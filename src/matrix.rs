// src/matrix.rs
use arrow::{
    array::{Array, ArrayRef, Float64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    collections::HashMap,
    fs::File,
    io::Write,
    path::Path,
    sync::Arc,
};

use crate::error::{BoxError, PipelineError, Result};

/// Named columns over row-major `f64` data; NaN marks a missing value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumericMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl NumericMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> std::result::Result<Self, String> {
        if let Some(i) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(format!(
                "row {} has {} values for {} columns",
                i,
                rows[i].len(),
                columns.len()
            ));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Append `values` as a new last column.
    pub fn with_column(mut self, name: &str, values: &[f64]) -> std::result::Result<Self, String> {
        if values.len() != self.rows.len() {
            return Err(format!(
                "column `{}` has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            ));
        }
        self.columns.push(name.to_string());
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.push(*v);
        }
        Ok(self)
    }

    /// Same data, bit-for-bit (NaN compares equal to NaN).
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()))
    }

    /// Arrow view: one nullable Float64 column per matrix column, NaN as null.
    pub fn to_record_batch(&self, metadata: HashMap<String, String>) -> Result<RecordBatch, BoxError> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c, DataType::Float64, true))
            .collect();
        let schema = Arc::new(Schema::new(fields).with_metadata(metadata));
        let arrays: Vec<ArrayRef> = (0..self.columns.len())
            .map(|j| {
                let col: Float64Array = self
                    .rows
                    .iter()
                    .map(|r| if r[j].is_nan() { None } else { Some(r[j]) })
                    .collect();
                Arc::new(col) as ArrayRef
            })
            .collect();
        let batch = if arrays.is_empty() {
            RecordBatch::try_new_with_options(
                schema,
                arrays,
                &arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(self.rows.len())),
            )?
        } else {
            RecordBatch::try_new(schema, arrays)?
        };
        Ok(batch)
    }

    /// Encode as Parquet into `out`.
    pub fn write_parquet<W: Write + Send>(
        &self,
        out: W,
        metadata: HashMap<String, String>,
    ) -> Result<(), BoxError> {
        let batch = self.to_record_batch(metadata)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Decode a file written by [`write_parquet`]; returns the schema metadata too.
    pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<(Self, HashMap<String, String>)> {
        let path = path.as_ref();
        let fail = |source: BoxError| PipelineError::FileFormat {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|e| fail(Box::new(e)))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| fail(Box::new(e)))?;
        let schema = builder.schema().clone();
        let metadata = schema.metadata().clone();
        let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
        let reader = builder.build().map_err(|e| fail(Box::new(e)))?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| fail(Box::new(e)))?;
            let cols: Vec<&Float64Array> = (0..batch.num_columns())
                .map(|j| {
                    batch
                        .column(j)
                        .as_any()
                        .downcast_ref::<Float64Array>()
                        .ok_or_else(|| fail(format!("column `{}` is not Float64", columns[j]).into()))
                })
                .collect::<Result<_>>()?;
            for i in 0..batch.num_rows() {
                rows.push(
                    cols.iter()
                        .map(|c| if c.is_null(i) { f64::NAN } else { c.value(i) })
                        .collect(),
                );
            }
        }
        Ok((Self { columns, rows }, metadata))
    }
}
