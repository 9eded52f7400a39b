//! Database error type: wraps the underlying driver error and
//! classifies it for callers that need to distinguish conflicts from
//! hard failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type DbResult<T> = Result<T, DbError>;
