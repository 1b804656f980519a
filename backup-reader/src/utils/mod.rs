//! Utility modules for the backup reader.

pub mod errors;
pub mod logger;
pub mod paths;

pub use errors::{ReaderError, Result};
