//! Storage merge layer
//!
//! Turns fetched API records into keyed rows, classifies each location by
//! province/city, and upserts through a `WeatherStore`. Also recomputes
//! daily summaries from stored hourly rows.

pub mod classifier;
pub mod memory;
pub mod merge;

pub use classifier::*;
pub use memory::*;
pub use merge::*;

use histwx_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot read classifier {path}: {source}")]
    ClassifierIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed classifier {path}: {source}")]
    ClassifierCsv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid classifier entry: {0}")]
    InvalidClassifier(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
