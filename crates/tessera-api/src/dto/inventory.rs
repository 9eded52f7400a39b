//! `GET /inventory?owner=W` (spec §4.7).

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct InventoryItem {
    pub item: String,
    pub game: String,
    pub last_updated_ledger_batch_id: u64,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub owner: String,
    pub items: Vec<InventoryItem>,
}
