//! Identity types for the temporal netting engine
//!
//! Wallet-like identities (owner, session, wallet) wrap an Ed25519 public
//! key; item and game identities are opaque operator-defined strings.
//! Batch identities are ULIDs so persistence keys sort by creation order
//! without a separate sequence column.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate public-key-backed ID types with common impls.
macro_rules! define_pubkey_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Build from raw 32-byte public key material.
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Parse from a hex-encoded public key.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let raw = hex::decode(s)?;
                let bytes: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(bytes))
            }

            /// Raw bytes of the underlying public key.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

define_pubkey_id!(OwnerId, "The owning wallet that authorised a session key");
define_pubkey_id!(SessionId, "An ephemeral session signing key");
define_pubkey_id!(WalletId, "A wallet participating in cash deltas");

/// Opaque, operator-defined item identifier (e.g. an in-game asset id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, operator-defined game/namespace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub String);

impl GameId {
    /// The namespace an item falls into when no intent that ever moved
    /// it tagged a `game` (the field is optional on every intent).
    pub fn unscoped() -> Self {
        GameId("default".to_string())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-assigned, globally unique intent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(pub String);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque local batch identity, a ULID so it sorts by creation time.
///
/// This is distinct from the ledger-enforced monotonic settlement
/// sequence number (see `tessera_types::settlement::LedgerBatchId`):
/// the mapping between the two is recorded on the batch header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub ulid::Ulid);

impl BatchId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ledger-enforced monotonic settlement sequence number.
///
/// `ledger_batch_id = last_committed_batch_id + 1`; never reused, never
/// assigned locally ahead of submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerBatchId(pub u64);

/// A settlement-ledger transaction reference, opaque to this system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(pub String);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
