//! The output of the netting kernel: final owners and net cash deltas.
//!
//! Per-item chain netting: instead of one net amount per counterparty
//! pair, this tracks one final owner per item and one net cash delta
//! per wallet, backed by a conservation proof that the sum of deltas
//! is zero.

use crate::{IntentId, ItemId, Signed128, WalletId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NettingResult {
    pub final_owners: BTreeMap<ItemId, WalletId>,
    pub net_cash_deltas: BTreeMap<WalletId, Signed128>,
    pub consumed_ids: Vec<IntentId>,
    pub skipped_ids: Vec<IntentId>,
    pub conservation: ConservationProof,
}

impl NettingResult {
    pub fn num_items(&self) -> u64 {
        self.final_owners.len() as u64
    }

    pub fn num_wallets(&self) -> u64 {
        self.net_cash_deltas.len() as u64
    }

    pub fn num_intents(&self) -> u64 {
        (self.consumed_ids.len() + self.skipped_ids.len()) as u64
    }
}

/// Proof that the sum of all net cash deltas is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationProof {
    pub net_sum: Signed128,
    pub verified: bool,
}

impl ConservationProof {
    pub fn check(net_sum: Signed128) -> Self {
        Self {
            net_sum,
            verified: net_sum.is_zero(),
        }
    }
}
