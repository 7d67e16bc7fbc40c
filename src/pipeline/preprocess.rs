// src/pipeline/preprocess.rs
//! Timestamp indexing, null normalization and feature/target separation.

use chrono::NaiveDateTime;

use crate::config::TransformationConfig;
use crate::error::{PipelineError, Result};
use crate::matrix::NumericMatrix;
use crate::table::{RecordTable, Value};

/// Text cell the raw collection uses for an absent reading.
pub const NONE_TOKEN: &str = "None";

/// Parse one timestamp cell with a chrono format string. Numbers and nulls never parse.
pub fn parse_timestamp(value: &Value, format: &str) -> Option<NaiveDateTime> {
    let s = value.as_text()?.trim();
    NaiveDateTime::parse_from_str(s, format).ok()
}

/// A table whose rows are keyed by their parsed start timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTable {
    pub index: Vec<NaiveDateTime>,
    pub table: RecordTable,
}

/// Index by the timestamp column, drop both timestamp columns, map `None` cells to null
/// and coerce every pollutant column to numbers (unparsable cells become null).
pub fn preprocess(mut table: RecordTable, cfg: &TransformationConfig) -> Result<IndexedTable> {
    let ts_col = &cfg.timestamp_column;
    let cells = table.drop_column(ts_col).ok_or_else(|| PipelineError::MissingColumn {
        column: ts_col.clone(),
        context: "indexing by timestamp".into(),
    })?;
    let index = cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            parse_timestamp(cell, &cfg.timestamp_format).ok_or_else(|| PipelineError::TimestampParse {
                column: ts_col.clone(),
                row,
                value: cell.to_string(),
                format: cfg.timestamp_format.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if !cfg.end_timestamp_column.is_empty() && table.drop_column(&cfg.end_timestamp_column).is_none() {
        return Err(PipelineError::MissingColumn {
            column: cfg.end_timestamp_column.clone(),
            context: "dropping end timestamp".into(),
        });
    }

    table.map_cells(|v| match v {
        Value::Text(s) if s == NONE_TOKEN => Value::Null,
        other => other.clone(),
    });

    for col in &cfg.pollutant_columns {
        let found = table.map_column(col, |v| match v.as_f64() {
            Some(n) if !n.is_nan() => Value::Number(n),
            _ => Value::Null,
        });
        if !found {
            return Err(PipelineError::MissingColumn {
                column: col.clone(),
                context: "coercing pollutant readings".into(),
            });
        }
    }

    Ok(IndexedTable { index, table })
}

/// Split into the feature matrix (every column but the target) and the target vector.
/// Nulls become NaN; any other non-numeric cell is an error.
pub fn split_features(frame: &IndexedTable, target: &str) -> Result<(NumericMatrix, Vec<f64>)> {
    let table = &frame.table;
    let target_idx = table.column_index(target).ok_or_else(|| PipelineError::MissingColumn {
        column: target.to_string(),
        context: "separating target".into(),
    })?;

    let columns: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != target_idx)
        .map(|(_, c)| c.clone())
        .collect();

    let numeric = |row: usize, col: usize, v: &Value| -> Result<f64> {
        match v {
            Value::Null => Ok(f64::NAN),
            other => other.as_f64().ok_or_else(|| {
                PipelineError::preprocessing(
                    "separating features",
                    format!(
                        "row {}: non-numeric `{}` in column `{}`",
                        row,
                        other,
                        table.columns()[col]
                    ),
                )
            }),
        }
    };

    let mut rows = Vec::with_capacity(table.len());
    let mut y = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        let mut x = Vec::with_capacity(columns.len());
        for (j, v) in row.iter().enumerate() {
            if j == target_idx {
                y.push(numeric(i, j, v)?);
            } else {
                x.push(numeric(i, j, v)?);
            }
        }
        rows.push(x);
    }
    let features =
        NumericMatrix::new(columns, rows).map_err(|e| PipelineError::preprocessing("separating features", e))?;
    Ok((features, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn cfg() -> TransformationConfig {
        TransformationConfig {
            pollutant_columns: vec!["PM2.5".into(), "NO2".into()],
            ..TransformationConfig::default()
        }
    }

    fn raw() -> RecordTable {
        RecordTable::new(
            ["From Date", "To Date", "PM2.5", "NO2"].iter().map(|s| s.to_string()).collect(),
            vec![
                vec![text("01-03-2021 05:00"), text("01-03-2021 06:00"), Value::Number(80.0), text("None")],
                vec![text("01-03-2021 06:00"), text("01-03-2021 07:00"), text("None"), text("12.5")],
                vec![text("01-03-2021 07:00"), text("01-03-2021 08:00"), Value::Number(95.0), text("bad")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn parses_day_first_timestamps() {
        let ts = parse_timestamp(&text(" 13-02-2020 21:45 "), "%d-%m-%Y %H:%M").unwrap();
        assert_eq!(ts, NaiveDate::from_ymd_opt(2020, 2, 13).unwrap().and_hms_opt(21, 45, 0).unwrap());
        assert!(parse_timestamp(&text("2020-02-13 21:45"), "%d-%m-%Y %H:%M").is_none());
        assert!(parse_timestamp(&Value::Null, "%d-%m-%Y %H:%M").is_none());
    }

    #[test]
    fn preprocess_indexes_and_coerces() {
        let frame = preprocess(raw(), &cfg()).unwrap();
        assert_eq!(frame.index.len(), 3);
        assert_eq!(frame.table.columns(), ["PM2.5", "NO2"]);
        assert_eq!(frame.table.rows()[0], vec![Value::Number(80.0), Value::Null]);
        assert_eq!(frame.table.rows()[1], vec![Value::Null, Value::Number(12.5)]);
        assert_eq!(frame.table.rows()[2][1], Value::Null);
    }

    #[test]
    fn unparsable_timestamp_names_the_row() {
        let mut t = raw();
        t.map_column("From Date", |v| {
            if v.as_text() == Some("01-03-2021 06:00") {
                text("2021/03/01 06:00")
            } else {
                v.clone()
            }
        });
        match preprocess(t, &cfg()) {
            Err(PipelineError::TimestampParse { row, value, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "2021/03/01 06:00");
            }
            other => panic!("expected timestamp error, got {:?}", other),
        }
    }

    #[test]
    fn missing_pollutant_column_is_reported() {
        let mut c = cfg();
        c.pollutant_columns.push("NH3".into());
        assert!(matches!(
            preprocess(raw(), &c),
            Err(PipelineError::MissingColumn { column, .. }) if column == "NH3"
        ));
    }

    #[test]
    fn target_is_separated_from_features() {
        let frame = preprocess(raw(), &cfg()).unwrap();
        let (x, y) = split_features(&frame, "PM2.5").unwrap();
        assert_eq!(x.columns(), ["NO2"]);
        assert_eq!(y[0], 80.0);
        assert!(y[1].is_nan());
        assert!(x.rows()[0][0].is_nan());
        assert_eq!(x.rows()[1][0], 12.5);
    }

    #[test]
    fn non_numeric_feature_is_a_preprocessing_error() {
        let mut t = raw();
        t.drop_column("To Date");
        let mut c = cfg();
        c.end_timestamp_column.clear();
        c.pollutant_columns = vec!["PM2.5".into()];
        let frame = preprocess(t, &c).unwrap();
        // NO2 left uncoerced still holds "bad"
        assert!(matches!(
            split_features(&frame, "PM2.5"),
            Err(PipelineError::Preprocessing { .. })
        ));
    }
}
