//! `GET /proof?item=<id>&batch=<id>`: a Merkle inclusion proof for one
//! settled item, recomputed from the batch's stored `(item,
//! final_owner)` leaf set rather than kept precomputed.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tessera_crypto::merkle;
use tessera_db::BatchRepo;
use tessera_types::{BatchState, ItemId};

use crate::dto::ProofResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProofQuery {
    pub item: String,
    pub batch: String,
}

pub async fn proof(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ProofQuery>,
) -> ApiResult<Json<ProofResponse>> {
    let batch_id = q
        .batch
        .parse::<ulid::Ulid>()
        .map(tessera_types::BatchId)
        .map_err(|_| ApiError::BadRequest("invalid batch id".into()))?;
    let item = ItemId(q.item.clone());

    let batches = BatchRepo::new(&state.db);
    let state_now = batches.state(&batch_id).await?.ok_or(ApiError::NotFound)?;
    if !matches!(state_now, BatchState::Settled | BatchState::Indexed) {
        return Err(ApiError::NotFound);
    }

    let settled = batches.settled_items(&batch_id).await?;
    if settled.is_empty() {
        return Err(ApiError::NotFound);
    }

    let index = settled
        .keys()
        .position(|k| k == &item)
        .ok_or(ApiError::NotFound)?;
    let owner = settled.get(&item).expect("index was just found above").clone();

    let leaves = merkle::leaves(&settled);
    let leaf = leaves[index];
    let proof = merkle::merkle_proof(&leaves, index).ok_or(ApiError::NotFound)?;
    let root = merkle::merkle_root(&leaves);

    Ok(Json(ProofResponse {
        batch_id: q.batch,
        item: q.item,
        owner: owner.to_string(),
        leaf: hex::encode(leaf),
        siblings: proof.0.into_iter().map(hex::encode).collect(),
        root: hex::encode(root),
    }))
}
