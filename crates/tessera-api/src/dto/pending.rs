//! `GET /pending` (spec §4.7): current pending-intent count.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending_count: i64,
}
