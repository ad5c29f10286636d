//! Error taxonomy for the extraction pipeline.
//!
//! Configuration problems are reported before any scanning happens. I/O,
//! database and output-collision errors abort the run. Parse and encoding
//! errors only cost one song its augmented copy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Usage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid file mask '{mask}': {message}")]
    Mask { mask: String, message: String },

    #[error("Output already exists: {path}")]
    OutputExists { path: PathBuf },

    #[error("Cannot parse {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Cannot handle {path} as {encoding}")]
    Encoding { path: PathBuf, encoding: String },
}

impl ExtractError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }

    /// Recoverable errors skip one song's augmentation; the run continues.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExtractError::Parse { .. } | ExtractError::Encoding { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
