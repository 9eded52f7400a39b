//! On-ledger settlement record and shadow-table projections.

use crate::{GameId, ItemId, LedgerBatchId, Signed128, WalletId};
use serde::{Deserialize, Serialize};

/// On-ledger tuple signed by the operator authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub ledger_batch_id: LedgerBatchId,
    pub merkle_root: [u8; 32],
    pub da_hash: [u8; 32],
    pub num_intents: u64,
    pub num_items: u64,
}

/// Ownership projection row: `(item, game) -> owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRow {
    pub item: ItemId,
    pub game: GameId,
    pub owner: WalletId,
    pub ledger_batch_id: LedgerBatchId,
    pub updated_at: i64,
}

/// Balance projection row: `(wallet, game) -> signed integer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub wallet: WalletId,
    pub game: GameId,
    pub delta_sum: Signed128,
    pub last_ledger_batch_id: LedgerBatchId,
}
