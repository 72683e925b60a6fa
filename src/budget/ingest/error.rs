use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error type covering the fatal failures of an ingestion run.
///
/// Row-level problems (noise rows, unparseable account codes, restated
/// headers) are not errors: they are counted in the per-sheet statistics and
/// the scan carries on.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Wrapper for IO failures such as reading configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a workbook lacks a sheet or a sheet lacks its expected shape.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a header-addressed sheet has no column with the given label.
    #[error("sheet '{sheet}' has no column named '{column}'")]
    MissingColumn { sheet: String, column: String },

    /// Raised when persisting a record fails. Ids allocated after `written`
    /// rows can no longer be trusted, so the run stops here.
    #[error("record sink failed after {written} rows: {source}")]
    Sink {
        written: u64,
        #[source]
        source: std::io::Error,
    },

    /// Raised when the configuration file holds inconsistent values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
