// ⚠️ Error taxonomy for the load → clean → aggregate → export pipeline
//
// Malformed cells never reach this type: they are absorbed as missing values
// by the cleaner. Only structural problems surface here.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source file does not exist
    #[error("Source file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Content is not well-formed delimited text
    #[error("Failed to parse {} (line {line}): {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// An operation produced zero usable rows
    #[error("No usable rows in {dataset} after {stage}")]
    EmptyResult { dataset: String, stage: String },

    /// Relational store could not be opened
    #[error("Could not connect to store at {}: {source}", path.display())]
    StoreConnection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store operation failed: {0}")]
    Store(#[from] rusqlite::Error),

    /// Column name not part of the table's fixed layout
    #[error("Unknown column '{column}' for table {table}")]
    UnknownColumn { table: String, column: String },

    /// Caller-supplied parameter outside its accepted range
    #[error("Invalid {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Spreadsheet export failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for errors a read-only view should skip over instead of aborting
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, PipelineError::StoreConnection { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
