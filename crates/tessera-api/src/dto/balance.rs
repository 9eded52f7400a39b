//! `GET /balance?wallet=W&game=G` (spec §4.7).

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub wallet: String,
    pub game: String,
    pub balance: i128,
}
