// src/pipeline/transformation.rs
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, instrument};

use crate::artifact::{TransformationArtifact, ValidationArtifact};
use crate::config::{TransformationConfig, TransformationPaths};
use crate::error::{PipelineError, Result};
use crate::impute::{build_imputer, Preprocessor};
use crate::matrix::NumericMatrix;
use crate::persist::StagedWrites;
use crate::pipeline::preprocess::{self, IndexedTable};
use crate::table::{read_csv, RecordTable};

/// Schema metadata key naming the target column of a transformed matrix.
pub const META_TARGET: &str = "aqpipe.target";

/// Fits the imputer on train and writes model-ready matrices for both splits.
pub struct Transformer {
    config: TransformationConfig,
    paths: TransformationPaths,
}

impl Transformer {
    pub fn new(config: TransformationConfig, paths: TransformationPaths) -> Self {
        Self { config, paths }
    }

    pub fn read(&self, path: &Path) -> Result<RecordTable> {
        read_csv(path)
    }

    pub fn preprocess(&self, table: RecordTable) -> Result<IndexedTable> {
        preprocess::preprocess(table, &self.config)
    }

    /// Fresh, unfitted preprocessor from the configured imputer settings.
    pub fn build_imputer(&self) -> Preprocessor {
        build_imputer(self.config.imputer)
    }

    fn prepare(&self, path: &Path, split: &str) -> Result<(NumericMatrix, Vec<f64>)> {
        let table = self.read(path)?;
        let frame = self
            .preprocess(table)
            .map_err(|e| PipelineError::preprocessing(format!("preprocessing {} split", split), e))?;
        let (x, y) = preprocess::split_features(&frame, &self.config.target_column)
            .map_err(|e| PipelineError::preprocessing(format!("separating {} features", split), e))?;
        info!(
            split,
            rows = x.n_rows(),
            features = x.n_cols(),
            first = ?frame.index.first(),
            last = ?frame.index.last(),
            "prepared split"
        );
        Ok((x, y))
    }

    #[instrument(level = "info", name = "transformation", skip_all)]
    pub fn run(&self, validation: &ValidationArtifact) -> Result<TransformationArtifact> {
        let (x_train, y_train) = self.prepare(&validation.valid_train_file_path, "train")?;
        let (x_test, y_test) = self.prepare(&validation.valid_test_file_path, "test")?;
        if x_train.columns() != x_test.columns() {
            return Err(PipelineError::preprocessing(
                "aligning splits",
                format!(
                    "train features {:?} differ from test features {:?}",
                    x_train.columns(),
                    x_test.columns()
                ),
            ));
        }

        let mut preprocessor = self.build_imputer();
        let train_out = preprocessor.fit_transform(&x_train)?;
        let test_out = preprocessor.transform(&x_test)?;

        let target = &self.config.target_column;
        let append = |m: NumericMatrix, y: &[f64]| {
            m.with_column(target, y)
                .map_err(|e| PipelineError::imputation("appending target", e))
        };
        let train_arr = append(train_out, &y_train)?;
        let test_arr = append(test_out, &y_test)?;
        let metadata = HashMap::from([(META_TARGET.to_string(), target.clone())]);

        let p = &self.paths;
        let mut writes = StagedWrites::new();
        writes.stage(&p.train_file, |w| write_matrix(w, &train_arr, &metadata, &p.train_file))?;
        writes.stage(&p.test_file, |w| write_matrix(w, &test_arr, &metadata, &p.test_file))?;
        writes.stage(&p.object_file, |w| preprocessor.save_to(w))?;
        writes.stage(&p.final_object_file, |w| preprocessor.save_to(w))?;
        let committed = writes.commit()?;
        info!(
            files = committed.len(),
            train_rows = train_arr.n_rows(),
            test_rows = test_arr.n_rows(),
            "saved transformed data"
        );

        Ok(TransformationArtifact {
            transformed_object_file_path: p.object_file.clone(),
            transformed_train_file_path: p.train_file.clone(),
            transformed_test_file_path: p.test_file.clone(),
            final_object_file_path: p.final_object_file.clone(),
        })
    }
}

fn write_matrix(
    out: &mut BufWriter<File>,
    matrix: &NumericMatrix,
    metadata: &HashMap<String, String>,
    path: &Path,
) -> Result<()> {
    matrix
        .write_parquet(out, metadata.clone())
        .map_err(|source| PipelineError::FileFormat {
            path: path.to_path_buf(),
            source,
        })
}
