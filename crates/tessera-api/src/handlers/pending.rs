//! `GET /pending`.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tessera_queue::IntentQueue;

use crate::dto::PendingResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn pending(State(state): State<Arc<AppState>>) -> ApiResult<Json<PendingResponse>> {
    let pending_count = IntentQueue::new(&state.db).pending_count().await?;
    Ok(Json(PendingResponse { pending_count }))
}
