// ============================================================================
// Error Handling
// ============================================================================

use thiserror::Error;

/// Failures raised while fetching, unpacking or reading the schedule feed.
///
/// `Fetch` and `Format` abort a refresh attempt only. `RowParse` is raised for
/// a single record and is always swallowed by the caller that skips the row.
#[derive(Error, Debug)]
pub enum TransitError {
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Row parse error: {0}")]
    RowParse(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

impl From<zip::result::ZipError> for TransitError {
    fn from(e: zip::result::ZipError) -> Self {
        TransitError::Format(format!("Invalid feed archive: {}", e))
    }
}

impl From<csv::Error> for TransitError {
    fn from(e: csv::Error) -> Self {
        TransitError::Format(format!("Invalid tabular resource: {}", e))
    }
}
