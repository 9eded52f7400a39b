//! `GET /proof?item=I&batch=B` (spec §4.5/§4.7): Merkle inclusion proof
//! for one item's leaf, recomputed on demand from the batch's stored
//! leaf set.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProofResponse {
    pub batch_id: String,
    pub item: String,
    pub owner: String,
    pub leaf: String,
    pub siblings: Vec<String>,
    pub root: String,
}
