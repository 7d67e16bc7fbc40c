pub mod ks;

pub use ks::{ks_2samp, KsMethod, KsResult};
