//! Tessera Indexer — shadow-table projection builder.
//!
//! Replays settlement events off the ledger's event stream into local
//! ownership/balance projections. Entirely derived state: if the
//! shadow tables are dropped, they can be rebuilt from scratch by
//! replaying every settled batch in ledger order. Matching a
//! settlement event back to the local batch that produced it prefers
//! an exact ledger-batch-id match and falls back to a merkle-root
//! comparison when the id is missing.

pub mod error;

pub use error::{IndexError, IndexResult};

use tessera_db::{BatchRepo, Database, ProjectionRepo};
use tessera_settlement::SettlementEvent;
use tessera_types::{BatchId, BatchState, LedgerBatchId};
use tracing::{info, warn};

pub struct Indexer<'a> {
    db: &'a Database,
}

impl<'a> Indexer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Apply one settlement event to the shadow tables and mark its
    /// local batch `INDEXED`. Idempotent: re-applying an event whose
    /// ledger batch id is at or behind a projection row's own stamp is
    /// a no-op there (`ProjectionRepo`'s per-row guard), and re-running
    /// this on an already-`INDEXED` batch just repeats those no-ops.
    pub async fn apply_event(&self, event: &SettlementEvent, now: i64) -> IndexResult<()> {
        let batch_id = self.match_batch(event).await?;
        self.apply_batch(&batch_id, event.ledger_batch_id, now).await?;

        let batches = BatchRepo::new(self.db);
        batches.set_state(&batch_id, BatchState::Indexed).await?;

        ProjectionRepo::new(self.db).advance_cursor(event.ledger_batch_id).await?;

        info!(
            batch_id = %batch_id,
            ledger_batch_id = event.ledger_batch_id.0,
            "batch indexed",
        );
        Ok(())
    }

    /// Replay every `SETTLED` batch at or after `from` in ledger order,
    /// applying each to the shadow tables and advancing the cursor as
    /// it goes. Used both for catch-up after a missed subscription and
    /// for a full shadow-table rebuild (`from = LedgerBatchId(0)`).
    pub async fn resync(&self, from: LedgerBatchId, now: i64) -> IndexResult<u64> {
        let batches = BatchRepo::new(self.db);
        let pending = batches.settled_since(from).await?;
        let count = pending.len() as u64;

        for (batch_id, ledger_batch_id) in pending {
            self.apply_batch(&batch_id, ledger_batch_id, now).await?;
            batches.set_state(&batch_id, BatchState::Indexed).await?;
            ProjectionRepo::new(self.db).advance_cursor(ledger_batch_id).await?;
        }

        if count > 0 {
            info!(from = from.0, applied = count, "resync applied settled batches");
        }
        Ok(count)
    }

    /// Strong match by the batch header's own `ledger_batch_id`, falling
    /// back to a count-based match against `SETTLED` batches that have
    /// not yet recorded one (e.g. a crash between commit and the header
    /// write landing).
    async fn match_batch(&self, event: &SettlementEvent) -> IndexResult<BatchId> {
        let batches = BatchRepo::new(self.db);
        if let Some(batch_id) = batches.find_by_ledger_batch_id(event.ledger_batch_id.0).await? {
            return Ok(batch_id);
        }
        match batches
            .find_settled_by_counts(event.num_intents, event.num_items)
            .await?
        {
            Some(batch_id) => {
                warn!(
                    ledger_batch_id = event.ledger_batch_id.0,
                    "matched settlement event by count fallback, not by ledger_batch_id",
                );
                Ok(batch_id)
            }
            None => Err(IndexError::UnmatchedBatch),
        }
    }

    async fn apply_batch(&self, batch_id: &BatchId, ledger_batch_id: LedgerBatchId, now: i64) -> IndexResult<()> {
        let batches = BatchRepo::new(self.db);
        let projections = ProjectionRepo::new(self.db);

        let settled_items = batches.settled_items_with_game(batch_id).await?;
        for (item, game, owner) in &settled_items {
            let previous = projections.owner_of(item, &game.0).await?;
            projections
                .apply_ownership(item, &game.0, previous.as_ref(), owner, ledger_batch_id, now)
                .await
                .map_err(|e| IndexError::ApplyFailed(e.to_string()))?;
        }

        let net_cash_deltas = batches.net_cash_deltas(batch_id).await?;
        let unscoped = tessera_types::GameId::unscoped();
        for (wallet, delta) in &net_cash_deltas {
            projections
                .apply_balance_delta(wallet, &unscoped.0, *delta, ledger_batch_id)
                .await
                .map_err(|e| IndexError::ApplyFailed(e.to_string()))?;
        }

        Ok(())
    }
}
