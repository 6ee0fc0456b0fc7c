use thiserror::Error;

/// Failures of the outer surfaces: config files, history database, exports.
///
/// Protocol conditions (no active step, threshold not yet valid, duplicate
/// presentation) are not errors and never show up here.
#[derive(Debug, Error)]
pub enum AudiosimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history database error: {0}")]
    History(#[from] rusqlite::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AudiosimError>;
