use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("netting conservation check failed; batch aborted")]
    ConservationFailed,
    #[error("illegal state transition")]
    IllegalTransition,
    #[error("database error: {0}")]
    Db(String),
}

impl From<tessera_db::DbError> for BatchError {
    fn from(e: tessera_db::DbError) -> Self {
        BatchError::Db(e.to_string())
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
