// src/schema/store.rs
use once_cell::sync::Lazy;
use serde_yaml::{Mapping, Value as YamlValue};
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

static BUILTIN_SCHEMA: &str = include_str!("../../config/schema.yaml");

static BUILTIN: Lazy<std::result::Result<SchemaStore, String>> =
    Lazy::new(|| SchemaStore::from_yaml_str("builtin", BUILTIN_SCHEMA).map_err(|e| e.to_string()));

/// One expected column and its dtype label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub dtype: String,
}

/// Expected-column specification, loaded once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStore {
    columns: Vec<SchemaColumn>,
}

impl SchemaStore {
    /// The specification compiled into the binary.
    pub fn builtin() -> Result<Self> {
        BUILTIN.clone().map_err(|reason| PipelineError::SchemaLoad {
            origin: "builtin".into(),
            source: reason.into(),
        })
    }

    /// Read a YAML mapping `column: dtype` from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| PipelineError::SchemaLoad {
            origin: origin.clone(),
            source: Box::new(e),
        })?;
        let store = Self::from_yaml_str(&origin, &text)?;
        info!(schema = %origin, columns = store.column_count(), "loaded schema");
        Ok(store)
    }

    /// Parse a schema document; `origin` only labels errors.
    pub fn from_yaml_str(origin: &str, text: &str) -> Result<Self> {
        let fail = |reason: String| PipelineError::SchemaLoad {
            origin: origin.to_string(),
            source: reason.into(),
        };

        let doc: YamlValue = serde_yaml::from_str(text).map_err(|e| PipelineError::SchemaLoad {
            origin: origin.to_string(),
            source: Box::new(e),
        })?;
        let mapping: Mapping = match doc {
            YamlValue::Mapping(m) => m,
            other => return Err(fail(format!("expected a mapping, found {:?}", other))),
        };

        let mut columns = Vec::with_capacity(mapping.len());
        for (key, meta) in mapping {
            let name = match key {
                YamlValue::String(s) if !s.trim().is_empty() => s,
                other => return Err(fail(format!("column name {:?} is not a string", other))),
            };
            let dtype = match meta {
                YamlValue::String(s) => s,
                YamlValue::Null => "object".to_string(),
                other => {
                    return Err(fail(format!(
                        "metadata for `{}` must be a dtype string, found {:?}",
                        name, other
                    )))
                }
            };
            debug!(column = %name, dtype = %dtype, "schema column");
            columns.push(SchemaColumn { name, dtype });
        }

        if columns.is_empty() {
            return Err(fail("schema declares no columns".into()));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}
