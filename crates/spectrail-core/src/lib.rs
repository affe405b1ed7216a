//! Shared wire/data types and the crate-wide error taxonomy.

pub mod error;
pub mod project;
pub mod types;

pub use error::{Error, Result};
pub use project::ProjectResolver;
pub use types::*;
