//! `GET /batch/{id}` (spec §4.7): counts, root, da_hash, settlement status.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub state: String,
    pub created_at: i64,
    pub netted_at: Option<i64>,
    pub ledger_batch_id: Option<u64>,
    pub tx_ref: Option<String>,
    pub merkle_root: Option<String>,
    pub da_hash: Option<String>,
    pub num_intents: Option<u64>,
    pub num_items: Option<u64>,
    pub num_wallets: Option<u64>,
    pub conservation_verified: Option<bool>,
}
