//! `POST /intents`: the intake endpoint, wiring the policy gate in
//! front of the durable queue.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tessera_policy::PolicyGate;
use tessera_queue::IntentQueue;

use crate::dto::{SubmitIntentRequest, SubmitIntentResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitIntentRequest>,
) -> ApiResult<Json<SubmitIntentResponse>> {
    let intent = req.0;
    let now = chrono::Utc::now().timestamp();

    let gate = PolicyGate::new(&state.db, &state.config);
    let queue = IntentQueue::new(&state.db);

    queue.submit(&gate, &intent, now).await?;
    Ok(Json(SubmitIntentResponse { accepted: true }))
}
