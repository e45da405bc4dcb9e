use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invoice not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Account not allowed: {0}")]
    AuthDenied(String),

    #[error("Invalid credential: {0}")]
    Credential(String),

    #[error("Sync failed: {0}")]
    Sync(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not read {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Lock poisoned: {0}")]
    Lock(&'static str),
}

pub type Result<T> = std::result::Result<T, AppError>;
