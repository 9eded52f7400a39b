//! Tessera Batch — window policy and the `OPEN` -> `NETTED` ->
//! `ABORTED` half of the batch lifecycle.
//!
//! `Commit`/`Finalise` (the `NETTED` -> `COMMITTED` -> `SETTLED` ->
//! `INDEXED` half) live in `tessera-settlement` and `tessera-indexer`,
//! which call straight through to the same `tessera_db::BatchRepo`
//! this crate uses, keeping one transaction per lifecycle step end to
//! end.

pub mod error;

pub use error::{BatchError, BatchResult};

use tessera_core::{EngineConfig, OverflowPolicy};
use tessera_db::{BatchRepo, Database};
use tessera_queue::IntentQueue;
use tessera_types::{BatchId, BatchState, NettingBatch, NettingResult};
use tracing::{info, warn};

/// Window policy: form a batch when the oldest pending
/// intent has aged past `batch_window_seconds`, or the pending count
/// has reached `max_intents_per_batch` (if nonzero) — in either case
/// only once the pending count has also reached the `min` floor.
pub fn should_form_batch(oldest_pending_age_seconds: i64, pending_count: i64, config: &EngineConfig) -> bool {
    if pending_count < config.min_intents_per_batch as i64 {
        return false;
    }
    let aged_out = oldest_pending_age_seconds >= config.batch_window_seconds as i64;
    let count_full =
        config.max_intents_per_batch > 0 && pending_count >= config.max_intents_per_batch as i64;
    aged_out || count_full
}

pub struct BatchManager<'a> {
    db: &'a Database,
    config: &'a EngineConfig,
}

impl<'a> BatchManager<'a> {
    pub fn new(db: &'a Database, config: &'a EngineConfig) -> Self {
        Self { db, config }
    }

    /// `FormBatch()`: Peek -> Lock a slice of pending intents, net them,
    /// and persist the `NETTED` result. Returns `None` if nothing was
    /// claimable (a concurrent batcher may have won the race).
    pub async fn form_batch(&self, now: i64) -> BatchResult<Option<NettingBatch>> {
        let queue = IntentQueue::new(self.db);
        let candidates = queue
            .peek(
                now,
                i64::MAX,
                if self.config.max_intents_per_batch > 0 {
                    self.config.max_intents_per_batch as i64
                } else {
                    i64::MAX
                },
            )
            .await?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let batch_id = BatchId::new();
        let ids: Vec<_> = candidates.iter().map(|i| i.id.clone()).collect();
        let claimed = queue.lock(&batch_id, &ids).await?;

        if claimed.is_empty() {
            return Ok(None);
        }

        let claimed_set: std::collections::HashSet<_> = claimed.iter().cloned().collect();
        let claimed_intents: Vec<_> = candidates
            .into_iter()
            .filter(|i| claimed_set.contains(&i.id))
            .collect();

        let mut batch = NettingBatch::new(batch_id.clone(), now, claimed.clone());
        let batches = BatchRepo::new(self.db);
        batches.create(&batch).await?;

        let result = tessera_netting::net(&claimed_intents, self.config.overflow_on_arithmetic);

        let mut item_games = std::collections::BTreeMap::new();
        for intent in &claimed_intents {
            if let Some(game) = &intent.game {
                item_games.entry(intent.item.clone()).or_insert_with(|| game.clone());
            }
        }

        match result {
            Some(result) if result.conservation.verified => {
                batches.record_netted(&batch_id, now, &result, &item_games).await?;
                batch.netted_at = Some(now);
                batch.state = BatchState::Netted;
                batch.result = Some(result);
                info!(batch_id = %batch_id, num_intents = batch.intent_ids.len(), "batch netted");
                Ok(Some(batch))
            }
            Some(result) => {
                warn!(batch_id = %batch_id, net_sum = %result.conservation.net_sum, "conservation check failed, aborting batch");
                self.abort(&batch_id, &claimed).await?;
                Err(BatchError::ConservationFailed)
            }
            None => {
                warn!(batch_id = %batch_id, "arithmetic overflow under abort-batch policy");
                self.abort(&batch_id, &claimed).await?;
                Err(BatchError::ConservationFailed)
            }
        }
    }

    /// `Abort(batch, reason)`: mark the batch `ABORTED` and return its
    /// intents to the queue (or terminally skip them), per
    /// `requeue_skipped`.
    pub async fn abort(&self, batch_id: &BatchId, intent_ids: &[tessera_types::IntentId]) -> BatchResult<()> {
        BatchRepo::new(self.db).set_state(batch_id, BatchState::Aborted).await?;
        IntentQueue::new(self.db)
            .finalise_aborted(batch_id, intent_ids, self.config.requeue_skipped)
            .await?;
        Ok(())
    }

    pub async fn state(&self, batch_id: &BatchId) -> BatchResult<Option<BatchState>> {
        Ok(BatchRepo::new(self.db).state(batch_id).await?)
    }

    pub async fn load_result(&self, batch_id: &BatchId) -> BatchResult<NettingResult> {
        let batches = BatchRepo::new(self.db);
        let net_cash_deltas = batches.net_cash_deltas(batch_id).await?;
        let net_sum = sum_deltas(&net_cash_deltas);
        Ok(NettingResult {
            final_owners: batches.settled_items(batch_id).await?,
            net_cash_deltas,
            consumed_ids: batches.consumed_intent_ids(batch_id).await?,
            skipped_ids: batches.skipped_intent_ids(batch_id).await?,
            conservation: tessera_types::ConservationProof::check(net_sum),
        })
    }
}

fn sum_deltas(
    deltas: &std::collections::BTreeMap<tessera_types::WalletId, tessera_types::Signed128>,
) -> tessera_types::Signed128 {
    deltas
        .values()
        .fold(tessera_types::Signed128::ZERO, |acc, d| acc.checked_add(*d).unwrap_or(acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: u64, min: usize, max: usize) -> EngineConfig {
        EngineConfig {
            batch_window_seconds: window,
            min_intents_per_batch: min,
            max_intents_per_batch: max,
            production_strict: false,
            environment: "dev".to_string(),
            disable_signature_verification: false,
            da_provider: tessera_core::DaProvider::ContentAddressed,
            ledger_confirmation_timeout_seconds: 30,
            circuit_breaker_k: 5,
            circuit_breaker_window_seconds: 120,
            overflow_on_arithmetic: OverflowPolicy::SkipIntent,
            requeue_skipped: false,
            partition_guard_seconds: 120,
            nonce_ttl_seconds: 86_400,
            processed_id_ttl_seconds: 604_800,
            database_url: "sqlite::memory:".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn forms_by_age_once_floor_is_met() {
        let config = config(60, 2, 0);
        assert!(!should_form_batch(61, 1, &config));
        assert!(should_form_batch(61, 2, &config));
        assert!(!should_form_batch(10, 2, &config));
    }

    #[test]
    fn forms_by_count_once_ceiling_is_reached() {
        let config = config(300, 1, 5);
        assert!(should_form_batch(0, 5, &config));
        assert!(!should_form_batch(0, 4, &config));
    }

    #[test]
    fn unbounded_max_never_triggers_by_count() {
        let config = config(300, 1, 0);
        assert!(!should_form_batch(0, 1_000_000, &config));
    }
}
