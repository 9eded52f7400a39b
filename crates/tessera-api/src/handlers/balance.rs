//! `GET /balance?wallet=<hex pubkey>&game=<id>`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tessera_db::ProjectionRepo;
use tessera_types::WalletId;

use crate::dto::BalanceResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub wallet: String,
    #[serde(default = "default_game")]
    pub game: String,
}

fn default_game() -> String {
    tessera_types::GameId::unscoped().0
}

pub async fn balance(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BalanceQuery>,
) -> ApiResult<Json<BalanceResponse>> {
    let wallet = WalletId::from_hex(&q.wallet).map_err(|_| ApiError::BadRequest("invalid wallet".into()))?;

    let balance = ProjectionRepo::new(&state.db).balance_of(&wallet, &q.game).await?;

    Ok(Json(BalanceResponse { wallet: q.wallet, game: q.game, balance: balance.0 }))
}
