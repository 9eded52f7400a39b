//! The canonical DA payload: everything needed to reconstruct a
//! batch's settlement content off-chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_types::{BatchId, ItemId, Signed128, WalletId};

/// JSON object keys must be strings, so items/wallets are rendered to
/// their canonical string forms here rather than carried as typed map
/// keys; cash deltas are serialised as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaPayload {
    pub batch_id: BatchId,
    pub timestamp: i64,
    pub num_intents: u64,
    pub num_items: u64,
    pub num_wallets: u64,
    pub final_owners: BTreeMap<String, String>,
    pub net_cash_deltas: BTreeMap<String, String>,
}

impl DaPayload {
    pub fn build(
        batch_id: BatchId,
        timestamp: i64,
        num_intents: u64,
        final_owners: &BTreeMap<ItemId, WalletId>,
        net_cash_deltas: &BTreeMap<WalletId, Signed128>,
    ) -> Self {
        Self {
            batch_id,
            timestamp,
            num_intents,
            num_items: final_owners.len() as u64,
            num_wallets: net_cash_deltas.len() as u64,
            final_owners: final_owners
                .iter()
                .map(|(item, owner)| (item.0.clone(), owner.to_string()))
                .collect(),
            net_cash_deltas: net_cash_deltas
                .iter()
                .map(|(wallet, delta)| (wallet.to_string(), delta.0.to_string()))
                .collect(),
        }
    }

    /// Canonical JSON bytes: `serde_json` over a `BTreeMap`-backed
    /// struct already produces deterministic key ordering.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
