use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("duplicate intent id")]
    DuplicateId,
    #[error("session nonce already used")]
    NonceReused,
    #[error("rejected by the policy gate: {0:?}")]
    Policy(tessera_types::RejectReason),
    #[error("database error: {0}")]
    Db(String),
}

impl From<tessera_db::DbError> for QueueError {
    fn from(e: tessera_db::DbError) -> Self {
        QueueError::Db(e.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
