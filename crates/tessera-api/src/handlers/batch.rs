//! `GET /batch/{id}`.

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use tessera_db::BatchRepo;
use tessera_types::BatchId;

use crate::dto::BatchResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchResponse>> {
    let batch_id = parse_batch_id(&batch_id).ok_or_else(|| ApiError::BadRequest("invalid batch id".into()))?;

    let summary = BatchRepo::new(&state.db)
        .summary(&batch_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(BatchResponse {
        batch_id: batch_id.to_string(),
        state: format!("{:?}", summary.state).to_uppercase(),
        created_at: summary.created_at,
        netted_at: summary.netted_at,
        ledger_batch_id: summary.ledger_batch_id.map(|id| id.0),
        tx_ref: summary.tx_ref.map(|t| t.0),
        merkle_root: summary.merkle_root,
        da_hash: summary.da_hash,
        num_intents: summary.num_intents,
        num_items: summary.num_items,
        num_wallets: summary.num_wallets,
        conservation_verified: summary.conservation_verified,
    }))
}

fn parse_batch_id(s: &str) -> Option<BatchId> {
    s.parse::<ulid::Ulid>().ok().map(BatchId)
}
