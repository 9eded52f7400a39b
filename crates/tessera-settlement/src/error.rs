//! Settlement submission failure taxonomy.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The ledger rejected the submission outright; retry with a
    /// refreshed `last_committed_batch_id`. `next` is always computed
    /// fresh from the ledger's own sequence immediately before
    /// submission (no locally-assigned sequence is ever compared
    /// against it), so a `SEQUENCE_SKEW` in spec.md's sense — a stale
    /// local next drifting from the ledger's — cannot arise here; see
    /// DESIGN.md.
    #[error("ledger rejected submission: {0}")]
    LedgerReject(String),

    /// Exhausted retries against a transient network failure.
    #[error("transient network error, retries exhausted: {0}")]
    NetworkExhausted(String),

    #[error("database error: {0}")]
    Db(String),

    /// `DaPayload` failed to serialise to canonical JSON. The payload is
    /// built entirely from this crate's own `Serialize` types, so this
    /// should never happen in practice; it is still a recoverable error
    /// rather than a panic, since a future payload field could in
    /// principle carry a `serde_json::Value` with a non-string map key.
    #[error("DA payload serialisation failed: {0}")]
    Serialize(String),
}

impl From<tessera_db::DbError> for SettlementError {
    fn from(e: tessera_db::DbError) -> Self {
        SettlementError::Db(e.to_string())
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
