//! Error types for the data-loader crate.
//!
//! Row-level problems (a bad line in a dump, an orphaned alternate name) are
//! never surfaced through these types: they are counted by the readers and
//! the ETL run. What remains here is fatal for a run.

use thiserror::Error;

/// Errors that can occur while reading datasets or talking to the store
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// Dataset file could not be opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading a file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The delimited reader failed below the row level (e.g. unreadable header)
    #[error("Delimited file error: {0}")]
    Csv(#[from] csv::Error),

    /// The consolidated store could not be opened, read or written
    #[error("Store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    /// A required column is missing from a dataset header
    #[error("Missing column '{column}' in header of {file}")]
    MissingColumn { file: String, column: String },

    /// Line in data file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: u64,
        reason: String,
    },

    /// A stored value could not be decoded
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
