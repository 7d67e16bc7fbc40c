// src/impute/knn.rs
//! Nearest-neighbour imputation over NaN-aware Euclidean distance.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{ImputerConfig, Weighting};
use crate::error::{PipelineError, Result};
use crate::matrix::NumericMatrix;

/// Statistics learned from the training split.
#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    data: NumericMatrix,
    /// Columns with at least one observed value; the others are dropped on output.
    observed: Vec<bool>,
    /// Column means over observed values, the fallback when no donor is reachable.
    means: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnImputer {
    n_neighbors: usize,
    weights: Weighting,
    fitted: Option<Fitted>,
}

impl KnnImputer {
    pub fn new(config: ImputerConfig) -> Self {
        Self {
            n_neighbors: config.n_neighbors.max(1),
            weights: config.weights,
            fitted: None,
        }
    }

    pub fn config(&self) -> ImputerConfig {
        ImputerConfig {
            n_neighbors: self.n_neighbors,
            weights: self.weights,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Training matrix the imputer draws donors from.
    pub fn fit_data(&self) -> Option<&NumericMatrix> {
        self.fitted.as_ref().map(|f| &f.data)
    }

    /// Names of the columns `transform` emits.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        self.fitted.as_ref().map(|f| {
            f.data
                .columns()
                .iter()
                .zip(&f.observed)
                .filter(|(_, keep)| **keep)
                .map(|(c, _)| c.clone())
                .collect()
        })
    }

    /// Learn donors and fallback means from `x`. Replaces any earlier fit.
    pub fn fit(&mut self, x: &NumericMatrix) -> Result<()> {
        if x.n_rows() == 0 {
            return Err(PipelineError::imputation("fitting", "training matrix has no rows"));
        }
        let n_cols = x.n_cols();
        let mut sums = vec![0.0; n_cols];
        let mut counts = vec![0usize; n_cols];
        for row in x.rows() {
            for (j, v) in row.iter().enumerate() {
                if !v.is_nan() {
                    sums[j] += v;
                    counts[j] += 1;
                }
            }
        }
        let observed: Vec<bool> = counts.iter().map(|&c| c > 0).collect();
        for (name, _) in x.columns().iter().zip(&observed).filter(|(_, o)| !**o) {
            warn!(column = %name, "no observed values in training data; column will be dropped");
        }
        let means = sums
            .iter()
            .zip(&counts)
            .map(|(s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
            .collect();

        debug!(rows = x.n_rows(), cols = n_cols, "fitted knn imputer");
        self.fitted = Some(Fitted {
            data: x.clone(),
            observed,
            means,
        });
        Ok(())
    }

    /// Fill every NaN in `x` from the fitted donors. Rows are independent.
    pub fn transform(&self, x: &NumericMatrix) -> Result<NumericMatrix> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| PipelineError::imputation("transforming", "imputer is not fitted"))?;
        if x.columns() != fitted.data.columns() {
            return Err(PipelineError::imputation(
                "transforming",
                format!(
                    "columns {:?} do not match fitted columns {:?}",
                    x.columns(),
                    fitted.data.columns()
                ),
            ));
        }

        let rows: Vec<Vec<f64>> = x
            .rows()
            .par_iter()
            .map(|row| self.impute_row(fitted, row))
            .collect();
        let columns = self.output_columns().unwrap_or_default();
        NumericMatrix::new(columns, rows).map_err(|e| PipelineError::imputation("transforming", e))
    }

    pub fn fit_transform(&mut self, x: &NumericMatrix) -> Result<NumericMatrix> {
        self.fit(x)?;
        self.transform(x)
    }

    fn impute_row(&self, fitted: &Fitted, row: &[f64]) -> Vec<f64> {
        let needs_fill = row
            .iter()
            .zip(&fitted.observed)
            .any(|(v, keep)| *keep && v.is_nan());
        let distances: Vec<f64> = if needs_fill {
            fitted
                .data
                .rows()
                .iter()
                .map(|donor| nan_euclidean(row, donor))
                .collect()
        } else {
            Vec::new()
        };

        row.iter()
            .enumerate()
            .filter(|(j, _)| fitted.observed[*j])
            .map(|(j, &v)| {
                if v.is_nan() {
                    self.impute_cell(fitted, &distances, j)
                } else {
                    v
                }
            })
            .collect()
    }

    fn impute_cell(&self, fitted: &Fitted, distances: &[f64], col: usize) -> f64 {
        let mut donors: Vec<(f64, f64)> = fitted
            .data
            .rows()
            .iter()
            .zip(distances)
            .filter(|(donor, d)| !donor[col].is_nan() && !d.is_nan())
            .map(|(donor, &d)| (d, donor[col]))
            .collect();
        if donors.is_empty() {
            return fitted.means[col];
        }
        // stable: equal distances keep training order
        donors.sort_by(|a, b| a.0.total_cmp(&b.0));
        donors.truncate(self.n_neighbors);

        match self.weights {
            Weighting::Uniform => donors.iter().map(|(_, v)| v).sum::<f64>() / donors.len() as f64,
            Weighting::Distance => {
                let exact: Vec<f64> = donors.iter().filter(|(d, _)| *d == 0.0).map(|(_, v)| *v).collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = donors
                    .iter()
                    .fold((0.0, 0.0), |(num, den), (d, v)| (num + v / d, den + 1.0 / d));
                num / den
            }
        }
    }
}

/// `sqrt(n / present · Σ (x − y)²)` over coordinates observed in both rows; NaN if none are.
pub fn nan_euclidean(x: &[f64], y: &[f64]) -> f64 {
    let mut present = 0usize;
    let mut sq = 0.0;
    for (a, b) in x.iter().zip(y) {
        if !a.is_nan() && !b.is_nan() {
            present += 1;
            sq += (a - b) * (a - b);
        }
    }
    if present == 0 {
        return f64::NAN;
    }
    (x.len() as f64 / present as f64 * sq).sqrt()
}
