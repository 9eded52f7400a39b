//! Gate rejection taxonomy, one variant per `RejectReason`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("duplicate intent id")]
    DuplicateId,
    #[error("session nonce already used")]
    NonceReused,
    #[error("signature does not verify")]
    BadSignature,
    #[error("no session policy registered for this owner/session pair")]
    NoPolicy,
    #[error("session policy has expired")]
    Expired,
    #[error("action is not permitted by this session policy")]
    ActionNotAllowed,
    #[error("cumulative spend would exceed the session cap")]
    OverCap,
    #[error("intent is structurally malformed")]
    Malformed,
    #[error("database error: {0}")]
    Db(String),
}

impl From<tessera_db::DbError> for PolicyError {
    fn from(e: tessera_db::DbError) -> Self {
        PolicyError::Db(e.to_string())
    }
}

impl PolicyError {
    pub fn reject_reason(&self) -> tessera_types::RejectReason {
        use tessera_types::RejectReason::*;
        match self {
            PolicyError::DuplicateId => DuplicateId,
            PolicyError::NonceReused => NonceReused,
            PolicyError::BadSignature => BadSignature,
            PolicyError::NoPolicy => NoPolicy,
            PolicyError::Expired => Expired,
            PolicyError::ActionNotAllowed => ActionNotAllowed,
            PolicyError::OverCap => OverCap,
            PolicyError::Malformed => Malformed,
            PolicyError::Db(_) => Malformed,
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
