//! Infrastructure helpers for filesystem and environment interactions.

pub mod paths;

pub use paths::{default_data_dir, expand_tilde, resolve_data_dir};
