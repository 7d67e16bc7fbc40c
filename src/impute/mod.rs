// src/impute/mod.rs
pub mod knn;

pub use knn::KnnImputer;

use std::{collections::HashMap, io::Write, path::Path};
use tracing::info;

use crate::config::{ImputerConfig, Weighting};
use crate::error::{PipelineError, Result};
use crate::matrix::NumericMatrix;

const META_STEPS: &str = "aqpipe.steps";
const META_N_NEIGHBORS: &str = "aqpipe.imputer.n_neighbors";
const META_WEIGHTS: &str = "aqpipe.imputer.weights";

/// A fit/transform stage of the preprocessor.
#[derive(Debug, Clone)]
pub enum Step {
    Imputer(KnnImputer),
}

impl Step {
    fn fit(&mut self, x: &NumericMatrix) -> Result<()> {
        match self {
            Step::Imputer(imp) => imp.fit(x),
        }
    }

    fn transform(&self, x: &NumericMatrix) -> Result<NumericMatrix> {
        match self {
            Step::Imputer(imp) => imp.transform(x),
        }
    }
}

/// Ordered, named processing steps fitted as a unit.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    steps: Vec<(String, Step)>,
}

/// The preprocessor the pipeline trains: a single `imputer` step.
pub fn build_imputer(config: ImputerConfig) -> Preprocessor {
    Preprocessor::new(vec![("imputer".into(), Step::Imputer(KnnImputer::new(config)))])
}

impl Preprocessor {
    pub fn new(steps: Vec<(String, Step)>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[(String, Step)] {
        &self.steps
    }

    /// Fit each step on the output of the steps before it.
    pub fn fit(&mut self, x: &NumericMatrix) -> Result<()> {
        let mut current = x.clone();
        let last = self.steps.len().saturating_sub(1);
        for (i, (_, step)) in self.steps.iter_mut().enumerate() {
            step.fit(&current)?;
            if i < last {
                current = step.transform(&current)?;
            }
        }
        Ok(())
    }

    pub fn transform(&self, x: &NumericMatrix) -> Result<NumericMatrix> {
        self.steps
            .iter()
            .try_fold(x.clone(), |acc, (_, step)| step.transform(&acc))
    }

    pub fn fit_transform(&mut self, x: &NumericMatrix) -> Result<NumericMatrix> {
        self.fit(x)?;
        self.transform(x)
    }

    fn single_imputer(&self) -> Result<&KnnImputer> {
        match self.steps.as_slice() {
            [(_, Step::Imputer(imp))] => Ok(imp),
            _ => Err(PipelineError::imputation(
                "serializing preprocessor",
                format!("expected one imputer step, found {}", self.steps.len()),
            )),
        }
    }

    /// Encode the fitted state as Parquet: the donor matrix plus hyperparameters in metadata.
    pub fn save_to<W: Write + Send>(&self, out: W) -> Result<()> {
        let imp = self.single_imputer()?;
        let data = imp.fit_data().ok_or_else(|| {
            PipelineError::imputation("serializing preprocessor", "imputer is not fitted")
        })?;
        let cfg = imp.config();
        let metadata = HashMap::from([
            (
                META_STEPS.to_string(),
                self.steps.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(","),
            ),
            (META_N_NEIGHBORS.to_string(), cfg.n_neighbors.to_string()),
            (META_WEIGHTS.to_string(), cfg.weights.as_str().to_string()),
        ]);
        data.write_parquet(out, metadata)
            .map_err(|e| PipelineError::imputation("serializing preprocessor", e))
    }

    /// Rebuild a fitted preprocessor written by [`save_to`](Self::save_to).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (data, metadata) = NumericMatrix::read_parquet(path)?;
        let bad = |reason: String| {
            PipelineError::imputation(format!("loading preprocessor {}", path.display()), reason)
        };

        let step = metadata
            .get(META_STEPS)
            .ok_or_else(|| bad(format!("missing `{}`", META_STEPS)))?
            .clone();
        let n_neighbors = metadata
            .get(META_N_NEIGHBORS)
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| bad(format!("missing or invalid `{}`", META_N_NEIGHBORS)))?;
        let weights = metadata
            .get(META_WEIGHTS)
            .and_then(|v| Weighting::from_str(v))
            .ok_or_else(|| bad(format!("missing or invalid `{}`", META_WEIGHTS)))?;

        let mut imp = KnnImputer::new(ImputerConfig { n_neighbors, weights });
        imp.fit(&data)?;
        info!(path = %path.display(), rows = data.n_rows(), "loaded preprocessor");
        Ok(Self::new(vec![(step, Step::Imputer(imp))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn saved_preprocessor_transforms_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preprocessor.parquet");
        let train = NumericMatrix::new(
            vec!["NO2".into(), "SO2".into()],
            vec![vec![1.0, 2.0], vec![f64::NAN, 4.0], vec![3.0, 6.0], vec![5.0, f64::NAN]],
        )
        .unwrap();
        let cfg = ImputerConfig {
            n_neighbors: 2,
            weights: Weighting::Distance,
        };

        let mut pre = build_imputer(cfg);
        let out = pre.fit_transform(&train).unwrap();
        pre.save_to(File::create(&path).unwrap()).unwrap();

        let loaded = Preprocessor::load(&path).unwrap();
        assert_eq!(loaded.steps()[0].0, "imputer");
        let Step::Imputer(imp) = &loaded.steps()[0].1;
        assert_eq!(imp.config(), cfg);
        assert!(loaded.transform(&train).unwrap().bitwise_eq(&out));
    }

    #[test]
    fn unfitted_preprocessor_cannot_be_saved() {
        let pre = build_imputer(ImputerConfig::default());
        assert!(matches!(
            pre.save_to(Vec::new()),
            Err(PipelineError::Imputation { .. })
        ));
    }
}
