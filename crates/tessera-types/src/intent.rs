//! TradeIntent: a signed instruction to move one item between wallets.

use crate::{Amount, GameId, IntentAction, IntentId, ItemId, OwnerId, SessionId, WalletId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: IntentId,
    pub session: SessionId,
    pub owner: OwnerId,
    pub item: ItemId,
    pub from: WalletId,
    pub to: WalletId,
    pub amount: Amount,
    pub nonce: u64,
    /// Base64 (or hex, as a fallback) encoded Ed25519 signature.
    pub signature: String,
    pub created_at: i64,
    pub game: Option<GameId>,
    pub listing: Option<String>,
    pub action: IntentAction,
}

impl TradeIntent {
    /// Structural validity independent of signatures or policy: `from !=
    /// to`. Malformed intents never even reach signature verification.
    pub fn is_well_formed(&self) -> bool {
        self.from != self.to
    }

    pub fn session_nonce(&self) -> (SessionId, u64) {
        (self.session.clone(), self.nonce)
    }
}

/// Reasons the submission interface can reject an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    DuplicateId,
    NonceReused,
    BadSignature,
    NoPolicy,
    Expired,
    ActionNotAllowed,
    OverCap,
    Malformed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::DuplicateId => "DUPLICATE_ID",
            RejectReason::NonceReused => "NONCE_REUSED",
            RejectReason::BadSignature => "BAD_SIGNATURE",
            RejectReason::NoPolicy => "NO_POLICY",
            RejectReason::Expired => "EXPIRED",
            RejectReason::ActionNotAllowed => "ACTION_NOT_ALLOWED",
            RejectReason::OverCap => "OVER_CAP",
            RejectReason::Malformed => "MALFORMED",
        }
    }
}
