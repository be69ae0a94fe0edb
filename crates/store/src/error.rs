//! Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dead letter entry at line {line}: {message}")]
    DeadLetterFormat { line: usize, message: String },

    #[error("{0}")]
    Contract(#[from] contracts::ContractError),
}
