use jobtrail_core::{QueryError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no job with url {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored value that no longer parses (hand-edited database, old schema).
    #[error("corrupt {column} value {value:?}")]
    Corrupt { column: &'static str, value: String },
}

impl StoreError {
    pub(crate) fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        StoreError::Corrupt {
            column,
            value: value.into(),
        }
    }
}
