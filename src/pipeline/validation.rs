// src/pipeline/validation.rs
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use tracing::{info, instrument, warn};

use crate::artifact::{IngestionArtifact, ValidationArtifact};
use crate::config::{PipelineConfig, ValidationConfig, ValidationPaths};
use crate::error::{PipelineError, Result};
use crate::persist::write_atomic;
use crate::pipeline::preprocess::{parse_timestamp, NONE_TOKEN};
use crate::schema::SchemaStore;
use crate::stats::ks_2samp;
use crate::table::{read_csv, write_csv, RecordTable, Value};

/// Outcome of the KS test for one column.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    /// True when `p_value` fell below the threshold.
    pub drift_status: bool,
}

/// Per-column drift results, in train column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriftReport {
    columns: Vec<(String, ColumnDrift)>,
}

impl DriftReport {
    pub fn columns(&self) -> &[(String, ColumnDrift)] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&ColumnDrift> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, d)| d)
    }

    /// Names of the columns that drifted.
    pub fn drifted(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, d)| d.drift_status)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Overall status: true when nothing drifted.
    pub fn status(&self) -> bool {
        self.columns.iter().all(|(_, d)| !d.drift_status)
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

impl Serialize for DriftReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, drift) in &self.columns {
            map.serialize_entry(column, &DriftEntry(drift))?;
        }
        map.end()
    }
}

struct DriftEntry<'a>(&'a ColumnDrift);

impl Serialize for DriftEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("p_value", &self.0.p_value)?;
        map.serialize_entry("drift_status", &self.0.drift_status)?;
        map.end()
    }
}

/// Load the configured schema file, or the built-in one.
pub fn load_schema(cfg: &ValidationConfig) -> Result<SchemaStore> {
    match &cfg.schema_file {
        Some(path) => SchemaStore::load(path),
        None => SchemaStore::builtin(),
    }
}

/// Per-column samples ready for the KS test.
///
/// Nulls and `None` cells are missing. A column is numeric when any remaining value in either
/// split parses as a number; text cells that do not parse are then skipped. Otherwise values
/// are compared by their rank in the sorted union of both splits' distinct strings.
fn column_samples(train: &RecordTable, test: &RecordTable, column: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let cells = |t: &RecordTable| -> Vec<Value> {
        t.column(column)
            .map(|it| {
                it.filter(|v| !v.is_null() && v.as_text() != Some(NONE_TOKEN))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    };
    let (a, b) = (cells(train), cells(test));

    let numeric = a.iter().chain(&b).any(|v| v.as_f64().is_some());
    let (xa, xb): (Vec<f64>, Vec<f64>) = if numeric {
        let nums = |vs: &[Value]| -> Vec<f64> {
            vs.iter().filter_map(Value::as_f64).filter(|n| !n.is_nan()).collect()
        };
        (nums(&a), nums(&b))
    } else {
        let vocab: BTreeSet<String> = a.iter().chain(&b).map(|v| v.to_string()).collect();
        let vocab: Vec<String> = vocab.into_iter().collect();
        let rank = |vs: &[Value]| -> Vec<f64> {
            vs.iter()
                .filter_map(|v| vocab.binary_search(&v.to_string()).ok())
                .map(|r| r as f64)
                .collect()
        };
        (rank(&a), rank(&b))
    };

    if xa.len() < 2 || xb.len() < 2 {
        return Err(PipelineError::StatTest {
            column: column.to_string(),
            reason: format!(
                "need at least 2 non-null values per split, got {} train and {} test",
                xa.len(),
                xb.len()
            ),
        });
    }
    Ok((xa, xb))
}

/// Run the KS test on every column present in both splits, in train column order.
/// Columns found in only one split are logged and left out of the report.
pub fn compute_drift(train: &RecordTable, test: &RecordTable, threshold: f64) -> Result<DriftReport> {
    for column in test.columns().iter().filter(|c| train.column_index(c).is_none()) {
        warn!(column = %column, "column only in test split; skipped drift check");
    }
    let mut columns = Vec::with_capacity(train.columns().len());
    for column in train.columns() {
        if test.column_index(column).is_none() {
            warn!(column = %column, "column only in train split; skipped drift check");
            continue;
        }
        let (a, b) = column_samples(train, test, column)?;
        let ks = ks_2samp(&a, &b).ok_or_else(|| PipelineError::StatTest {
            column: column.clone(),
            reason: "samples could not be compared".into(),
        })?;
        let drift = ColumnDrift {
            p_value: ks.p_value,
            drift_status: ks.p_value < threshold,
        };
        if drift.drift_status {
            warn!(column = %column, p_value = ks.p_value, statistic = ks.statistic, "drift detected");
        }
        columns.push((column.clone(), drift));
    }
    Ok(DriftReport { columns })
}

/// Checks the split files against the schema, quarantines unusable rows and reports drift.
pub struct Validator {
    schema: SchemaStore,
    paths: ValidationPaths,
    threshold: f64,
    timestamp_column: String,
    timestamp_format: String,
}

impl Validator {
    /// Parses the schema once, up front.
    pub fn new(config: &PipelineConfig, paths: ValidationPaths) -> Result<Self> {
        let schema = load_schema(&config.validation)?;
        info!(columns = schema.column_count(), "loaded schema");
        Ok(Self::with_schema(schema, config, paths))
    }

    pub fn with_schema(schema: SchemaStore, config: &PipelineConfig, paths: ValidationPaths) -> Self {
        Self {
            schema,
            paths,
            threshold: config.validation.drift_threshold,
            timestamp_column: config.transformation.timestamp_column.clone(),
            timestamp_format: config.transformation.timestamp_format.clone(),
        }
    }

    pub fn schema(&self) -> &SchemaStore {
        &self.schema
    }

    /// True when the table has exactly as many columns as the schema declares.
    pub fn check_column_count(&self, table: &RecordTable) -> bool {
        let expected = self.schema.column_count();
        let found = table.columns().len();
        info!(expected, found, "checked column count");
        expected == found
    }

    /// Compare train and test column by column and persist the report.
    pub fn detect_drift(&self, train: &RecordTable, test: &RecordTable) -> Result<DriftReport> {
        let report = compute_drift(train, test, self.threshold)?;
        let path = &self.paths.drift_report_file;
        let yaml = report.to_yaml().map_err(|e| PipelineError::FileFormat {
            path: path.clone(),
            source: Box::new(e),
        })?;
        write_atomic(path, |w| {
            w.write_all(yaml.as_bytes())
                .map_err(|e| PipelineError::io("writing drift report", path, e))
        })?;
        info!(
            path = %path.display(),
            status = report.status(),
            drifted = ?report.drifted(),
            "wrote drift report"
        );
        Ok(report)
    }

    /// Split rows into (valid, invalid) by whether their timestamp parses.
    pub fn quarantine(&self, table: &RecordTable) -> Result<(RecordTable, RecordTable)> {
        let idx = table
            .column_index(&self.timestamp_column)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: self.timestamp_column.clone(),
                context: "quarantining unparsable rows".into(),
            })?;
        Ok(table.partition(|row| parse_timestamp(&row[idx], &self.timestamp_format).is_some()))
    }

    #[instrument(level = "info", name = "validation", skip_all)]
    pub fn run(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact> {
        let train = read_csv(&ingestion.train_file_path)?;
        let test = read_csv(&ingestion.test_file_path)?;

        for (split, table) in [("train", &train), ("test", &test)] {
            if !self.check_column_count(table) {
                return Err(PipelineError::SchemaMismatch {
                    split: split.to_string(),
                    expected: self.schema.column_count(),
                    found: table.columns().len(),
                });
            }
        }

        let (valid_train, invalid_train) = self.quarantine(&train)?;
        let (valid_test, invalid_test) = self.quarantine(&test)?;
        if !invalid_train.is_empty() || !invalid_test.is_empty() {
            warn!(
                train = invalid_train.len(),
                test = invalid_test.len(),
                "quarantined rows with unusable timestamps"
            );
        }

        let report = self.detect_drift(&valid_train, &valid_test)?;

        write_csv(&self.paths.valid_train_file, &valid_train)?;
        write_csv(&self.paths.valid_test_file, &valid_test)?;
        let invalid_train_file_path = self.write_invalid(&self.paths.invalid_train_file, &invalid_train)?;
        let invalid_test_file_path = self.write_invalid(&self.paths.invalid_test_file, &invalid_test)?;

        Ok(ValidationArtifact {
            validation_status: report.status(),
            valid_train_file_path: self.paths.valid_train_file.clone(),
            valid_test_file_path: self.paths.valid_test_file.clone(),
            invalid_train_file_path,
            invalid_test_file_path,
            drift_report_file_path: self.paths.drift_report_file.clone(),
        })
    }

    /// Write quarantined rows, or clear a stale file from an earlier run into the same directory.
    fn write_invalid(&self, path: &std::path::Path, rows: &RecordTable) -> Result<Option<std::path::PathBuf>> {
        if rows.is_empty() {
            if path.exists() {
                fs::remove_file(path).map_err(|e| PipelineError::io("removing stale invalid file", path, e))?;
            }
            return Ok(None);
        }
        write_csv(path, rows)?;
        Ok(Some(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn paths(root: &Path) -> ValidationPaths {
        ValidationPaths {
            valid_train_file: root.join("validated/train.csv"),
            valid_test_file: root.join("validated/test.csv"),
            invalid_train_file: root.join("invalid/train.csv"),
            invalid_test_file: root.join("invalid/test.csv"),
            drift_report_file: root.join("drift_report/report.yaml"),
        }
    }

    fn schema() -> SchemaStore {
        SchemaStore::from_yaml_str("test", "From Date: datetime\nNO2: float64\n").unwrap()
    }

    fn validator(root: &Path) -> Validator {
        Validator::with_schema(schema(), &PipelineConfig::default(), paths(root))
    }

    /// Box–Muller draws from N(mean, 1).
    fn normal(rng: &mut StdRng, n: usize, mean: f64) -> Vec<f64> {
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                mean + (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    fn table(ts: impl Fn(usize) -> Value, values: &[f64]) -> RecordTable {
        RecordTable::new(
            vec!["From Date".into(), "NO2".into()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![ts(i), Value::Number(*v)])
                .collect(),
        )
        .unwrap()
    }

    fn stamp(i: usize) -> Value {
        Value::Text(format!("{:02}-01-2021 {:02}:00", i % 28 + 1, i % 24))
    }

    #[test]
    fn shifted_distribution_is_flagged() {
        let mut rng = StdRng::seed_from_u64(7);
        let train = table(stamp, &normal(&mut rng, 200, 0.0));
        let test = table(stamp, &normal(&mut rng, 200, 5.0));
        let report = compute_drift(&train, &test, 0.05).unwrap();

        let no2 = report.get("NO2").unwrap();
        assert!(no2.drift_status);
        assert!(no2.p_value < 1e-10);
        assert!(!report.status());
        assert_eq!(report.drifted(), vec!["NO2"]);
    }

    #[test]
    fn same_distribution_mostly_passes() {
        let mut rng = StdRng::seed_from_u64(11);
        let flagged = (0..100)
            .filter(|_| {
                let train = table(stamp, &normal(&mut rng, 60, 0.0));
                let test = table(stamp, &normal(&mut rng, 40, 0.0));
                compute_drift(&train, &test, 0.05).unwrap().get("NO2").unwrap().drift_status
            })
            .count();
        assert!(flagged <= 12, "flagged {} of 100", flagged);
    }

    #[test]
    fn all_null_column_cannot_be_tested() {
        let train = table(stamp, &[f64::NAN, f64::NAN, f64::NAN]);
        let test = table(stamp, &[1.0, 2.0]);
        let train = RecordTable::new(
            train.columns().to_vec(),
            train.rows().iter().map(|r| vec![r[0].clone(), Value::Null]).collect(),
        )
        .unwrap();
        assert!(matches!(
            compute_drift(&train, &test, 0.05),
            Err(PipelineError::StatTest { column, .. }) if column == "NO2"
        ));
    }

    #[test]
    fn none_only_column_cannot_be_tested() {
        let none_column = |n: usize| {
            RecordTable::new(
                vec!["NO2".into(), "NH3".into()],
                (0..n)
                    .map(|i| vec![Value::Number(i as f64), Value::Text("None".into())])
                    .collect(),
            )
            .unwrap()
        };
        assert!(matches!(
            compute_drift(&none_column(5), &none_column(3), 0.05),
            Err(PipelineError::StatTest { column, .. }) if column == "NH3"
        ));
    }

    #[test]
    fn columns_missing_from_one_split_are_skipped() {
        let cells = |names: [&str; 2]| {
            RecordTable::new(
                names.iter().map(|s| s.to_string()).collect(),
                (0..4)
                    .map(|i| vec![Value::Number(i as f64), Value::Number((i * 2) as f64)])
                    .collect(),
            )
            .unwrap()
        };
        let report = compute_drift(&cells(["A", "B"]), &cells(["A", "C"]), 0.05).unwrap();
        assert_eq!(report.columns().len(), 1);
        assert_eq!(report.columns()[0].0, "A");
        assert!(report.get("B").is_none());
        assert!(report.get("C").is_none());
    }

    #[test]
    fn p_value_at_threshold_is_not_drift() {
        let single = |values: &[f64]| {
            RecordTable::new(
                vec!["NO2".into()],
                values.iter().map(|v| vec![Value::Number(*v)]).collect(),
            )
            .unwrap()
        };
        let (a, b) = ([1.0, 2.0, 3.0, 4.0, 5.0], [6.0, 7.0, 8.0, 9.0, 10.0]);
        let p = ks_2samp(&a, &b).unwrap().p_value;
        assert!((p - 2.0 / 252.0).abs() < 1e-12);

        let at = compute_drift(&single(&a), &single(&b), p).unwrap();
        assert_eq!(at.get("NO2").unwrap().p_value, p);
        assert!(!at.get("NO2").unwrap().drift_status);

        let above = compute_drift(&single(&a), &single(&b), p * (1.0 + 1e-9)).unwrap();
        assert!(above.get("NO2").unwrap().drift_status);
    }

    #[test]
    fn text_columns_compare_by_rank() {
        let train = table(stamp, &[1.0, 2.0, 3.0]);
        let test = table(stamp, &[1.0, 2.0, 3.0]);
        let report = compute_drift(&train, &test, 0.05).unwrap();
        // identical timestamps, identical readings
        assert_eq!(report.get("From Date").unwrap().p_value, 1.0);
        assert!(report.status());
    }

    #[test]
    fn report_yaml_keeps_column_order() {
        let report = DriftReport {
            columns: vec![
                ("b".into(), ColumnDrift { p_value: 0.5, drift_status: false }),
                ("a".into(), ColumnDrift { p_value: 0.01, drift_status: true }),
            ],
        };
        let yaml = report.to_yaml().unwrap();
        assert!(yaml.find("b:").unwrap() < yaml.find("a:").unwrap());
        let back: BTreeMap<String, ColumnDrift> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back["a"], ColumnDrift { p_value: 0.01, drift_status: true });
    }

    #[test]
    fn column_count_mismatch_fails_the_stage() {
        let dir = tempdir().unwrap();
        let v = validator(dir.path());
        let wide = RecordTable::new(
            vec!["From Date".into(), "NO2".into(), "SO2".into()],
            vec![vec![stamp(0), Value::Number(1.0), Value::Number(2.0)]],
        )
        .unwrap();
        assert!(!v.check_column_count(&wide));

        let train = dir.path().join("in/train.csv");
        let test = dir.path().join("in/test.csv");
        write_csv(&train, &wide).unwrap();
        write_csv(&test, &table(stamp, &[1.0])).unwrap();
        let artifact = IngestionArtifact {
            feature_store_file_path: dir.path().join("in/store.csv"),
            train_file_path: train,
            test_file_path: test,
            train_rows: 1,
            test_rows: 1,
        };
        assert!(matches!(
            v.run(&artifact),
            Err(PipelineError::SchemaMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn unparsable_timestamps_are_quarantined() {
        let dir = tempdir().unwrap();
        let v = validator(dir.path());
        let mut rng = StdRng::seed_from_u64(3);
        let bad_every_fifth = |i: usize| if i % 5 == 0 { Value::Text("yesterday".into()) } else { stamp(i) };
        let train_t = table(bad_every_fifth, &normal(&mut rng, 20, 0.0));
        let test_t = table(stamp, &normal(&mut rng, 10, 0.0));

        let train = dir.path().join("in/train.csv");
        let test = dir.path().join("in/test.csv");
        write_csv(&train, &train_t).unwrap();
        write_csv(&test, &test_t).unwrap();
        let artifact = v
            .run(&IngestionArtifact {
                feature_store_file_path: dir.path().join("in/store.csv"),
                train_file_path: train,
                test_file_path: test,
                train_rows: 20,
                test_rows: 10,
            })
            .unwrap();

        let invalid = artifact.invalid_train_file_path.expect("quarantined train rows");
        assert_eq!(read_csv(invalid).unwrap().len(), 4);
        assert_eq!(read_csv(&artifact.valid_train_file_path).unwrap().len(), 16);
        assert!(artifact.invalid_test_file_path.is_none());
        assert!(artifact.drift_report_file_path.exists());
    }
}
