pub mod store;

pub use store::{SchemaColumn, SchemaStore};
