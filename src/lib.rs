pub mod artifact;
pub mod config;
pub mod error;
pub mod fetch;
pub mod impute;
pub mod matrix;
pub mod persist;
pub mod pipeline;
pub mod schema;
pub mod stats;
pub mod table;

pub use error::{PipelineError, Result};
