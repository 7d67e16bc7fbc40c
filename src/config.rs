// src/config.rs
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{PipelineError, Result};

/// Everything the pipeline needs, loaded once and handed to each stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    /// Root under which every run gets its own timestamped directory.
    pub artifact_dir: PathBuf,
    /// Stable location of the "current model" preprocessor.
    pub final_model_dir: PathBuf,
    /// Fixed run directory name; a fresh `%m_%d_%Y_%H_%M_%S` stamp when unset.
    pub run_timestamp: Option<String>,
    pub source: SourceConfig,
    pub ingestion: IngestionConfig,
    pub validation: ValidationConfig,
    pub transformation: TransformationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// `http(s)://...` for a remote store, `file://...` or a bare path for a dump directory.
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    pub feature_store_file_name: String,
    pub train_file_name: String,
    pub test_file_name: String,
    /// Fraction of rows held out for test, strictly between 0 and 1.
    pub test_ratio: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Built-in schema when unset.
    pub schema_file: Option<PathBuf>,
    pub drift_threshold: f64,
    pub drift_report_file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransformationConfig {
    pub target_column: String,
    pub timestamp_column: String,
    pub end_timestamp_column: String,
    pub timestamp_format: String,
    pub pollutant_columns: Vec<String>,
    pub imputer: ImputerConfig,
    pub train_file_name: String,
    pub test_file_name: String,
    pub object_file_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImputerConfig {
    pub n_neighbors: usize,
    pub weights: Weighting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    Uniform,
    Distance,
}

impl Weighting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weighting::Uniform => "uniform",
            Weighting::Distance => "distance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Some(Weighting::Uniform),
            "distance" => Some(Weighting::Distance),
            _ => None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "PollutionForecastingPipeline".into(),
            artifact_dir: PathBuf::from("Artifacts"),
            final_model_dir: PathBuf::from("final_model"),
            run_timestamp: None,
            source: SourceConfig::default(),
            ingestion: IngestionConfig::default(),
            validation: ValidationConfig::default(),
            transformation: TransformationConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "store".into(),
            database: "delhi_pollution".into(),
            collection: "air_quality".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            feature_store_file_name: "delhi_pollution_data.csv".into(),
            train_file_name: "train.csv".into(),
            test_file_name: "test.csv".into(),
            test_ratio: 0.2,
            seed: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_file: None,
            drift_threshold: 0.05,
            drift_report_file_name: "report.yaml".into(),
        }
    }
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            target_column: "PM2.5".into(),
            timestamp_column: "From Date".into(),
            end_timestamp_column: "To Date".into(),
            timestamp_format: "%d-%m-%Y %H:%M".into(),
            pollutant_columns: ["PM2.5", "PM10", "NO2", "NOx", "SO2", "CO", "Ozone", "NH3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            imputer: ImputerConfig::default(),
            train_file_name: "train.parquet".into(),
            test_file_name: "test.parquet".into(),
            object_file_name: "preprocessing.parquet".into(),
        }
    }
}

impl Default for ImputerConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 3,
            weights: Weighting::Uniform,
        }
    }
}

impl PipelineConfig {
    /// Read a YAML config; missing fields fall back to their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::io("reading config", path, e))?;
        let cfg: PipelineConfig = serde_yaml::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("parsing {}: {}", path.display(), e))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = self.ingestion.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "ingestion.test_ratio must be in (0, 1), got {}",
                ratio
            )));
        }
        let threshold = self.validation.drift_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "validation.drift_threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        if self.transformation.imputer.n_neighbors == 0 {
            return Err(PipelineError::InvalidConfig(
                "transformation.imputer.n_neighbors must be positive".into(),
            ));
        }
        if self.transformation.target_column.is_empty()
            || self.transformation.timestamp_column.is_empty()
        {
            return Err(PipelineError::InvalidConfig(
                "target and timestamp columns must be named".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every output path for one run.
    pub fn layout(&self) -> RunLayout {
        let stamp = self
            .run_timestamp
            .clone()
            .unwrap_or_else(|| Local::now().format("%m_%d_%Y_%H_%M_%S").to_string());
        RunLayout::new(self, stamp)
    }
}

/// Output paths of one run, all rooted at `<artifact_dir>/<stamp>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    pub run_dir: PathBuf,
    pub ingestion: IngestionPaths,
    pub validation: ValidationPaths,
    pub transformation: TransformationPaths,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestionPaths {
    pub feature_store_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPaths {
    pub valid_train_file: PathBuf,
    pub valid_test_file: PathBuf,
    pub invalid_train_file: PathBuf,
    pub invalid_test_file: PathBuf,
    pub drift_report_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformationPaths {
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub object_file: PathBuf,
    pub final_object_file: PathBuf,
}

impl RunLayout {
    fn new(cfg: &PipelineConfig, stamp: String) -> Self {
        let run_dir = cfg.artifact_dir.join(stamp);

        let ingestion_dir = run_dir.join("data_ingestion");
        let ingested = ingestion_dir.join("ingested");
        let ingestion = IngestionPaths {
            feature_store_file: ingestion_dir
                .join("feature_store")
                .join(&cfg.ingestion.feature_store_file_name),
            train_file: ingested.join(&cfg.ingestion.train_file_name),
            test_file: ingested.join(&cfg.ingestion.test_file_name),
        };

        let validation_dir = run_dir.join("data_validation");
        let validation = ValidationPaths {
            valid_train_file: validation_dir
                .join("validated")
                .join(&cfg.ingestion.train_file_name),
            valid_test_file: validation_dir
                .join("validated")
                .join(&cfg.ingestion.test_file_name),
            invalid_train_file: validation_dir
                .join("invalid")
                .join(&cfg.ingestion.train_file_name),
            invalid_test_file: validation_dir
                .join("invalid")
                .join(&cfg.ingestion.test_file_name),
            drift_report_file: validation_dir
                .join("drift_report")
                .join(&cfg.validation.drift_report_file_name),
        };

        let transformation_dir = run_dir.join("data_transformation");
        let t = &cfg.transformation;
        let transformation = TransformationPaths {
            train_file: transformation_dir.join("transformed").join(&t.train_file_name),
            test_file: transformation_dir.join("transformed").join(&t.test_file_name),
            object_file: transformation_dir
                .join("transformed_object")
                .join(&t.object_file_name),
            final_object_file: cfg.final_model_dir.join("preprocessor.parquet"),
        };

        Self {
            run_dir,
            ingestion,
            validation,
            transformation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            "artifact_dir: out\ningestion:\n  test_ratio: 0.25\n  seed: 7\ntransformation:\n  imputer:\n    weights: distance\n"
        )
        .unwrap();

        let cfg = PipelineConfig::load(f.path()).unwrap();
        assert_eq!(cfg.artifact_dir, PathBuf::from("out"));
        assert_eq!(cfg.ingestion.test_ratio, 0.25);
        assert_eq!(cfg.ingestion.seed, Some(7));
        assert_eq!(cfg.ingestion.train_file_name, "train.csv");
        assert_eq!(cfg.transformation.imputer.weights, Weighting::Distance);
        assert_eq!(cfg.transformation.imputer.n_neighbors, 3);
        assert_eq!(cfg.transformation.pollutant_columns.len(), 8);
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let mut cfg = PipelineConfig::default();
        cfg.ingestion.test_ratio = 1.0;
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn layout_is_rooted_at_run_stamp() {
        let cfg = PipelineConfig {
            run_timestamp: Some("01_02_2024_03_04_05".into()),
            ..PipelineConfig::default()
        };
        let layout = cfg.layout();
        assert_eq!(layout.run_dir, PathBuf::from("Artifacts/01_02_2024_03_04_05"));
        assert_eq!(
            layout.ingestion.train_file,
            PathBuf::from("Artifacts/01_02_2024_03_04_05/data_ingestion/ingested/train.csv")
        );
        assert_eq!(
            layout.transformation.final_object_file,
            PathBuf::from("final_model/preprocessor.parquet")
        );
    }
}
