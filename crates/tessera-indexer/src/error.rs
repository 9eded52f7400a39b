use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("no local batch matches this settlement event")]
    UnmatchedBatch,

    #[error("failed to apply batch to shadow tables: {0}")]
    ApplyFailed(String),

    #[error("database error: {0}")]
    Db(String),
}

impl From<tessera_db::DbError> for IndexError {
    fn from(e: tessera_db::DbError) -> Self {
        IndexError::Db(e.to_string())
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
