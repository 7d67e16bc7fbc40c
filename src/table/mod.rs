// src/table/mod.rs
pub mod csv_file;

pub use csv_file::{read_csv, write_csv};

use std::fmt;

use crate::error::{PipelineError, Result};

/// One cell of a record table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Interpret a raw CSV cell: empty is null; a number only when written in the form
    /// `Display` gives back, so `007` or `1.50` stay text and survive a rewrite unchanged.
    pub fn from_cell(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Null;
        }
        match raw.parse::<f64>() {
            Ok(n) if !n.is_nan() && n.to_string() == raw => Value::Number(n),
            _ => Value::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; text is parsed, null is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Rows of cells under one shared, ordered header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RecordTable {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(PipelineError::MalformedRecord {
                index,
                reason: format!("{} cells under {} columns", row.len(), columns.len()),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// New table holding the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Split rows by a predicate into (kept, rejected), preserving order.
    pub fn partition<F>(&self, mut keep: F) -> (Self, Self)
    where
        F: FnMut(&[Value]) -> bool,
    {
        let (kept, rejected): (Vec<_>, Vec<_>) =
            self.rows.iter().cloned().partition(|row| keep(row));
        (
            Self {
                columns: self.columns.clone(),
                rows: kept,
            },
            Self {
                columns: self.columns.clone(),
                rows: rejected,
            },
        )
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        Some(self.rows.iter_mut().map(|r| r.remove(idx)).collect())
    }

    /// Apply `f` to every cell of the named column.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    /// Apply `f` to every cell in the table.
    pub fn map_cells<F>(&mut self, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        for cell in self.rows.iter_mut().flatten() {
            *cell = f(cell);
        }
    }
}
