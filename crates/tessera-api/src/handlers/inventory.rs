//! `GET /inventory?owner=<hex pubkey>`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tessera_db::ProjectionRepo;
use tessera_types::WalletId;

use crate::dto::{InventoryItem, InventoryResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    pub owner: String,
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    Query(q): Query<InventoryQuery>,
) -> ApiResult<Json<InventoryResponse>> {
    let owner = WalletId::from_hex(&q.owner).map_err(|_| ApiError::BadRequest("invalid owner".into()))?;

    let rows = ProjectionRepo::new(&state.db).items_owned_by(&owner).await?;
    let items = rows
        .into_iter()
        .map(|(item, game, ledger_batch_id)| InventoryItem {
            item: item.0,
            game,
            last_updated_ledger_batch_id: ledger_batch_id.0,
        })
        .collect();

    Ok(Json(InventoryResponse { owner: q.owner, items }))
}
