// src/pipeline/ingestion.rs
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{info, instrument};

use crate::artifact::IngestionArtifact;
use crate::config::{IngestionConfig, IngestionPaths};
use crate::error::{PipelineError, Result};
use crate::fetch::{documents_to_table, RecordSource};
use crate::table::{write_csv, RecordTable};

/// Pulls the raw collection, snapshots it, and splits it into train/test.
pub struct Ingestor {
    source: Box<dyn RecordSource>,
    paths: IngestionPaths,
    test_ratio: f64,
    seed: u64,
}

impl Ingestor {
    /// Without a configured seed one is drawn here and logged, so the split can be replayed.
    pub fn new(source: Box<dyn RecordSource>, config: &IngestionConfig, paths: IngestionPaths) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        if config.seed.is_none() {
            info!(seed, "no split seed configured; drew one");
        }
        Self {
            source,
            paths,
            test_ratio: config.test_ratio,
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Read every document from the source into a table.
    pub fn fetch(&self) -> Result<RecordTable> {
        let start = Instant::now();
        let documents = self.source.fetch_documents()?;
        let table = documents_to_table(documents)?;
        info!(
            source = %self.source.location(),
            rows = table.len(),
            columns = table.columns().len(),
            elapsed = ?start.elapsed(),
            "fetched records"
        );
        Ok(table)
    }

    /// Snapshot the raw table; returns it unchanged.
    pub fn persist_feature_store(&self, table: RecordTable) -> Result<RecordTable> {
        write_csv(&self.paths.feature_store_file, &table)?;
        info!(path = %self.paths.feature_store_file.display(), "exported feature store");
        Ok(table)
    }

    /// Shuffle-split with the configured ratio and seed, then persist both halves.
    pub fn split(&self, table: &RecordTable) -> Result<(RecordTable, RecordTable)> {
        let (train, test) = train_test_split(table, self.test_ratio, self.seed)?;
        info!(train = train.len(), test = test.len(), seed = self.seed, "performed train test split");
        write_csv(&self.paths.train_file, &train)?;
        write_csv(&self.paths.test_file, &test)?;
        info!(
            train = %self.paths.train_file.display(),
            test = %self.paths.test_file.display(),
            "exported train and test files"
        );
        Ok((train, test))
    }

    #[instrument(level = "info", name = "ingestion", skip_all)]
    pub fn run(&self) -> Result<IngestionArtifact> {
        let table = self.fetch()?;
        let table = self.persist_feature_store(table)?;
        let (train, test) = self.split(&table)?;

        Ok(IngestionArtifact {
            feature_store_file_path: self.paths.feature_store_file.clone(),
            train_file_path: self.paths.train_file.clone(),
            test_file_path: self.paths.test_file.clone(),
            train_rows: train.len(),
            test_rows: test.len(),
        })
    }
}

/// Number of rows held out for test: `ceil(ratio · n)`, ignoring float noise below 1e-9.
pub fn test_size(n: usize, ratio: f64) -> usize {
    ((ratio * n as f64) - 1e-9).ceil().max(1.0) as usize
}

/// Pure split: the first `test_size` rows of a seeded permutation go to test, the rest to train.
pub fn train_test_split(table: &RecordTable, ratio: f64, seed: u64) -> Result<(RecordTable, RecordTable)> {
    let n = table.len();
    if n < 2 {
        return Err(PipelineError::InsufficientData {
            operation: "train/test split",
            rows: n,
            required: 2,
        });
    }
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test ratio must be in (0, 1), got {}",
            ratio
        )));
    }
    let n_test = test_size(n, ratio);
    if n_test >= n {
        return Err(PipelineError::InsufficientData {
            operation: "train/test split",
            rows: n,
            required: n_test + 1,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let (test_idx, train_idx) = order.split_at(n_test);
    Ok((table.select_rows(train_idx), table.select_rows(test_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Document, MemorySource};
    use crate::table::{read_csv, Value};
    use serde_json::json;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn numbered(n: usize) -> RecordTable {
        RecordTable::new(
            vec!["id".into()],
            (0..n).map(|i| vec![Value::Number(i as f64)]).collect(),
        )
        .unwrap()
    }

    fn ids(t: &RecordTable) -> Vec<usize> {
        t.rows().iter().map(|r| r[0].as_f64().unwrap() as usize).collect()
    }

    #[test]
    fn split_conserves_rows_and_ratio() {
        for (n, ratio, n_test) in [(100, 0.2, 20), (7, 0.3, 3), (2, 0.5, 1), (1000, 0.25, 250), (10, 0.7, 7)] {
            let (train, test) = train_test_split(&numbered(n), ratio, 1).unwrap();
            assert_eq!(train.len() + test.len(), n);
            assert_eq!(test.len(), n_test);

            let all: HashSet<usize> = ids(&train).into_iter().chain(ids(&test)).collect();
            assert_eq!(all.len(), n);
        }
    }

    #[test]
    fn same_seed_same_split() {
        let t = numbered(50);
        let a = train_test_split(&t, 0.2, 99).unwrap();
        let b = train_test_split(&t, 0.2, 99).unwrap();
        let c = train_test_split(&t, 0.2, 100).unwrap();
        assert_eq!(a, b);
        assert_ne!(ids(&a.1), ids(&c.1));
    }

    #[test]
    fn tiny_tables_are_insufficient() {
        for n in [0, 1] {
            assert!(matches!(
                train_test_split(&numbered(n), 0.2, 0),
                Err(PipelineError::InsufficientData { .. })
            ));
        }
        // ratio would leave train empty
        assert!(matches!(
            train_test_split(&numbered(2), 0.9, 0),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    fn synthetic_documents(n: usize) -> Vec<Document> {
        let pollutants = ["PM2.5", "PM10", "NO2", "NOx", "SO2", "CO", "Ozone", "NH3"];
        (0..n)
            .map(|i| {
                let mut doc = Document::new();
                doc.insert("_id".into(), json!({"$oid": format!("{:024x}", i)}));
                doc.insert("From Date".into(), json!(format!("01-01-2020 {:02}:00", i % 24)));
                doc.insert("To Date".into(), json!(format!("01-01-2020 {:02}:59", i % 24)));
                for (k, p) in pollutants.iter().enumerate() {
                    let v = if (i + k) % 11 == 0 { json!("na") } else { json!((i * (k + 1)) as f64 / 3.0) };
                    doc.insert(p.to_string(), v);
                }
                doc
            })
            .collect()
    }

    #[test]
    fn run_writes_feature_store_and_splits() {
        let dir = tempdir().unwrap();
        let paths = IngestionPaths {
            feature_store_file: dir.path().join("feature_store/data.csv"),
            train_file: dir.path().join("ingested/train.csv"),
            test_file: dir.path().join("ingested/test.csv"),
        };
        let cfg = IngestionConfig {
            test_ratio: 0.2,
            seed: Some(42),
            ..IngestionConfig::default()
        };
        let ingestor = Ingestor::new(
            Box::new(MemorySource::new(synthetic_documents(100))),
            &cfg,
            paths.clone(),
        );

        let artifact = ingestor.run().unwrap();
        assert_eq!((artifact.train_rows, artifact.test_rows), (80, 20));
        assert_eq!(artifact.train_file_path, paths.train_file);
        assert_eq!(artifact.test_file_path, paths.test_file);

        let store = read_csv(&paths.feature_store_file).unwrap();
        assert_eq!(store.len(), 100);
        assert_eq!(store.columns().len(), 10);
        assert!(store.column_index("_id").is_none());
        assert_eq!(read_csv(&paths.train_file).unwrap().len(), 80);
        assert_eq!(read_csv(&paths.test_file).unwrap().len(), 20);
    }
}
