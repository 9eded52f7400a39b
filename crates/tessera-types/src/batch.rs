//! NettingBatch lifecycle.
//!
//! A linear happy path with two abort exits, plus
//! `is_terminal`/`can_ingest`-style guard methods.

use crate::{BatchId, IntentId, LedgerBatchId, NettingResult, TxRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    Open,
    Netted,
    Committed,
    Settled,
    Indexed,
    Aborted,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Settled | BatchState::Indexed | BatchState::Aborted)
    }

    /// Whether `next` is a legal transition from `self`. State
    /// transitions are the only legal paths a batch can take.
    pub fn can_transition_to(&self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Open, Netted)
                | (Open, Aborted)
                | (Netted, Committed)
                | (Netted, Aborted)
                | (Committed, Settled)
                | (Committed, Aborted)
                | (Settled, Indexed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NettingBatch {
    pub batch_id: BatchId,
    pub created_at: i64,
    pub netted_at: Option<i64>,
    pub intent_ids: Vec<IntentId>,
    pub result: Option<NettingResult>,
    pub state: BatchState,
    pub ledger_batch_id: Option<LedgerBatchId>,
    pub tx_ref: Option<TxRef>,
    pub batch_hash: Option<[u8; 32]>,
}

impl NettingBatch {
    pub fn new(batch_id: BatchId, created_at: i64, intent_ids: Vec<IntentId>) -> Self {
        Self {
            batch_id,
            created_at,
            netted_at: None,
            intent_ids,
            result: None,
            state: BatchState::Open,
            ledger_batch_id: None,
            tx_ref: None,
            batch_hash: None,
        }
    }
}
