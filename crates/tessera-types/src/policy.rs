//! Session-key policy records: `SessionKeyPolicy` and `SpentCounter`.

use crate::{Amount, IntentAction, OwnerId, SessionId};
use serde::{Deserialize, Serialize};

/// Authorises an ephemeral session signer on behalf of an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeyPolicy {
    pub owner: OwnerId,
    pub session: SessionId,
    /// Cumulative spend cap across the policy's lifetime.
    pub cap: Amount,
    /// Unix seconds after which the policy is no longer live.
    pub expiry: i64,
    pub allowed_actions: Vec<IntentAction>,
    pub created_at: i64,
}

impl SessionKeyPolicy {
    /// `now < expiry` while live; once expired, never revived.
    pub fn is_live(&self, now: i64) -> bool {
        now < self.expiry
    }

    pub fn allows(&self, action: IntentAction) -> bool {
        self.allowed_actions.contains(&action)
    }
}

/// Per `(owner, session)` monotonically non-decreasing spend total.
///
/// Invariant: `spent <= cap` after every accepted increment. This is a
/// read-only snapshot type; the authoritative, atomically-incremented
/// counter lives in the durable store (see `tessera-policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentCounter {
    pub spent: Amount,
}

impl SpentCounter {
    pub fn zero() -> Self {
        Self { spent: Amount::ZERO }
    }

    pub fn would_exceed(&self, cap: Amount, amount: Amount) -> bool {
        self.spent.0 + amount.0 > cap.0
    }
}
