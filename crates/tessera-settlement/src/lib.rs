//! Tessera Settlement — Merkle commit, DA write, and the ledger
//! submission protocol (C5).
//!
//! `Committer::commit` is the `NETTED -> COMMITTED -> SETTLED` half of
//! the batch lifecycle; `tessera-batch` owns `OPEN -> NETTED`, and
//! `tessera-indexer` owns `SETTLED -> INDEXED`. The fake-confirmation
//! check is deliberately NOT performed here — it composes around this
//! module from `tessera-resilience`, keeping the submission path
//! separate from the watchdogs wrapping it.

pub mod error;
pub mod payload;
pub mod traits;

pub use error::{SettlementError, SettlementResult};
pub use payload::DaPayload;
pub use traits::{
    DataAvailabilityStore, InMemoryDaStore, InMemoryLedger, LedgerSubmission, SettlementEvent,
    SettlementLedger,
};

use std::sync::Arc;
use tessera_core::{DaProvider, EngineConfig};
use tessera_crypto::merkle;
use tessera_db::{BatchRepo, Database};
use tessera_types::{BatchId, BatchState, LedgerBatchId, SettlementRecord, TxRef};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// What `Committer::commit` hands back: either a batch that was
/// already finalised on an earlier call (idempotent re-invocation), or
/// a freshly-submitted one still awaiting the fake-confirmation check
/// that lives in `tessera-resilience` — deliberately NOT run from
/// inside this crate (see module doc).
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    AlreadySettled(SettlementRecord),
    PendingConfirmation(CommitReceipt),
}

/// A submitted-but-not-yet-confirmation-verified settlement. Callers
/// must verify `tx_ref` against the ledger's own view before calling
/// `Committer::finalize_settled`; on a failed verification the batch
/// must be aborted instead (`CONFIRMATION_FAKE`, spec.md §4.8/§7).
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub record: SettlementRecord,
    pub tx_ref: TxRef,
    pub confirmed_slot: u64,
}

pub struct Committer<'a> {
    db: &'a Database,
    config: &'a EngineConfig,
    ledger: Arc<dyn SettlementLedger>,
    da: Arc<dyn DataAvailabilityStore>,
}

impl<'a> Committer<'a> {
    pub fn new(
        db: &'a Database,
        config: &'a EngineConfig,
        ledger: Arc<dyn SettlementLedger>,
        da: Arc<dyn DataAvailabilityStore>,
    ) -> Self {
        Self { db, config, ledger, da }
    }

    /// Commit a `NETTED` batch: build the Merkle root, write the DA
    /// payload, submit to the ledger, and persist `COMMITTED`.
    /// Idempotent: an already-`SETTLED`/`INDEXED` batch returns its
    /// stored record with no further I/O; an already-`COMMITTED` batch
    /// (submitted on an earlier, crashed or still-verifying call) is
    /// not resubmitted — its stored submission is reloaded so the
    /// caller can (re-)run the confirmation check rather than
    /// double-spending a ledger sequence number.
    ///
    /// This method never transitions a batch to `SETTLED` itself: that
    /// is `finalize_settled`'s job, gated on the caller verifying the
    /// confirmation via `tessera-resilience`.
    pub async fn commit(&self, batch_id: &BatchId, now: i64) -> SettlementResult<CommitOutcome> {
        let batches = BatchRepo::new(self.db);

        if let Some(state) = batches.state(batch_id).await? {
            if matches!(state, BatchState::Settled | BatchState::Indexed) {
                return Ok(CommitOutcome::AlreadySettled(self.load_record(batch_id).await?));
            }
            if state == BatchState::Committed {
                let summary = batches
                    .summary(batch_id)
                    .await?
                    .ok_or_else(|| SettlementError::LedgerReject("batch not found".into()))?;
                let tx_ref = summary
                    .tx_ref
                    .clone()
                    .ok_or_else(|| SettlementError::LedgerReject("committed batch missing tx_ref".into()))?;
                let confirmed_slot = self
                    .ledger
                    .slot_for_tx(&tx_ref)
                    .await
                    .map_err(|e| SettlementError::NetworkExhausted(e.to_string()))?
                    .unwrap_or(0);
                return Ok(CommitOutcome::PendingConfirmation(CommitReceipt {
                    record: self.load_record(batch_id).await?,
                    tx_ref,
                    confirmed_slot,
                }));
            }
        }

        let final_owners = batches.settled_items(batch_id).await?;
        let net_cash_deltas = batches.net_cash_deltas(batch_id).await?;
        let consumed = batches.consumed_intent_ids(batch_id).await?;

        let leaves = merkle::leaves(&final_owners);
        let merkle_root = merkle::merkle_root(&leaves);

        let payload = DaPayload::build(batch_id.clone(), now, consumed.len() as u64, &final_owners, &net_cash_deltas);
        let da_hash = self.write_da(&payload).await?;

        let submission = self.submit_with_retry(merkle_root, da_hash, consumed.len() as u64, final_owners.len() as u64).await?;

        batches
            .record_committed(
                batch_id,
                submission.ledger_batch_id,
                &submission.submission.tx_ref,
                merkle_root,
                da_hash,
            )
            .await?;

        info!(batch_id = %batch_id, ledger_batch_id = submission.ledger_batch_id.0, "batch committed, awaiting confirmation check");

        Ok(CommitOutcome::PendingConfirmation(CommitReceipt {
            record: SettlementRecord {
                ledger_batch_id: submission.ledger_batch_id,
                merkle_root,
                da_hash,
                num_intents: consumed.len() as u64,
                num_items: final_owners.len() as u64,
            },
            tx_ref: submission.submission.tx_ref,
            confirmed_slot: submission.submission.confirmed_slot,
        }))
    }

    /// Transition a verified-confirmed `COMMITTED` batch to `SETTLED`.
    /// Idempotent: a no-op if the batch is already past `COMMITTED`.
    pub async fn finalize_settled(&self, batch_id: &BatchId) -> SettlementResult<()> {
        let batches = BatchRepo::new(self.db);
        if let Some(BatchState::Committed) = batches.state(batch_id).await? {
            batches.set_state(batch_id, BatchState::Settled).await?;
            info!(batch_id = %batch_id, "batch settled");
        }
        Ok(())
    }

    /// DA write failure does not abort settlement: the pointer is
    /// zeroed and the failure logged. A canonical-bytes serialisation
    /// failure, unlike a DA write failure, does abort the commit — there
    /// is no payload to hash a pointer from at all.
    async fn write_da(&self, payload: &DaPayload) -> SettlementResult<[u8; 32]> {
        let bytes = payload
            .canonical_bytes()
            .map_err(|e| SettlementError::Serialize(e.to_string()))?;
        Ok(match self.da.write(&bytes).await {
            Ok(store_id) => match self.config.da_provider {
                DaProvider::ContentAddressed => merkle::sha256(&bytes),
                DaProvider::HashOnly => merkle::sha256(store_id.as_bytes()),
            },
            Err(e) => {
                error!(error = %e, "DA write failed; proceeding with zeroed pointer");
                [0u8; 32]
            }
        })
    }

    /// Read-submit-verify against the ledger with bounded retry for
    /// `LEDGER_REJECT` and transient network errors; `SEQUENCE_SKEW`
    /// is never retried.
    async fn submit_with_retry(
        &self,
        merkle_root: [u8; 32],
        da_hash: [u8; 32],
        num_intents: u64,
        num_items: u64,
    ) -> SettlementResult<Submitted> {
        const MAX_ATTEMPTS: u32 = 5;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last = self
                .ledger
                .last_committed_batch_id()
                .await
                .map_err(|e| SettlementError::NetworkExhausted(e.to_string()))?;
            let next = LedgerBatchId(last.0 + 1);

            let result = tokio::time::timeout(
                Duration::from_secs(self.config.ledger_confirmation_timeout_seconds),
                self.ledger.submit(next, merkle_root, da_hash, num_intents, num_items),
            )
            .await;

            match result {
                Ok(Ok(submission)) => {
                    return Ok(Submitted { ledger_batch_id: next, submission });
                }
                Ok(Err(e)) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %e, "ledger rejected submission, retrying");
                    backoff(attempt).await;
                }
                Ok(Err(e)) => return Err(SettlementError::LedgerReject(e.to_string())),
                Err(_) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, "ledger submission timed out, retrying");
                    backoff(attempt).await;
                }
                Err(_) => {
                    return Err(SettlementError::NetworkExhausted("confirmation timeout".into()))
                }
            }
        }
    }

    async fn load_record(&self, batch_id: &BatchId) -> SettlementResult<SettlementRecord> {
        let batches = BatchRepo::new(self.db);
        let summary = batches
            .summary(batch_id)
            .await?
            .ok_or_else(|| SettlementError::LedgerReject("batch not found".into()))?;

        let merkle_root = summary
            .merkle_root
            .and_then(|hex_str| hex::decode(hex_str).ok())
            .and_then(|bytes| bytes.try_into().ok())
            .unwrap_or([0u8; 32]);
        let da_hash = summary
            .da_hash
            .and_then(|hex_str| hex::decode(hex_str).ok())
            .and_then(|bytes| bytes.try_into().ok())
            .unwrap_or([0u8; 32]);

        Ok(SettlementRecord {
            ledger_batch_id: summary.ledger_batch_id.unwrap_or(LedgerBatchId(0)),
            merkle_root,
            da_hash,
            num_intents: summary.num_intents.unwrap_or(0),
            num_items: summary.num_items.unwrap_or(0),
        })
    }
}

struct Submitted {
    ledger_batch_id: LedgerBatchId,
    submission: LedgerSubmission,
}

async fn backoff(attempt: u32) {
    use rand::Rng;
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(5));
    let jitter_ms = rand::thread_rng().gen_range(0..base_ms.max(1));
    sleep(Duration::from_millis(base_ms + jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tessera_db::DatabaseConfig;
    use tessera_types::{ConservationProof, GameId, IntentId, ItemId, NettingResult, Signed128, WalletId};

    async fn test_db() -> Database {
        let db = Database::connect(&DatabaseConfig::new("sqlite::memory:")).await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            batch_window_seconds: 60,
            min_intents_per_batch: 1,
            max_intents_per_batch: 0,
            production_strict: false,
            environment: "dev".to_string(),
            disable_signature_verification: false,
            da_provider: DaProvider::ContentAddressed,
            ledger_confirmation_timeout_seconds: 5,
            circuit_breaker_k: 5,
            circuit_breaker_window_seconds: 120,
            overflow_on_arithmetic: tessera_core::OverflowPolicy::SkipIntent,
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

    /// Build and persist a single `NETTED` batch of one item/one wallet
    /// pair the tests can commit.
    async fn netted_batch(db: &Database) -> BatchId {
        let batch_id = BatchId::new();
        let intent_ids = vec![IntentId("i1".into())];
        let batch = tessera_types::NettingBatch::new(batch_id.clone(), 1_000, intent_ids.clone());
        BatchRepo::new(db).create(&batch).await.unwrap();

        let mut final_owners = BTreeMap::new();
        final_owners.insert(ItemId("sword".into()), WalletId([2u8; 32]));
        let mut net_cash_deltas = BTreeMap::new();
        net_cash_deltas.insert(WalletId([1u8; 32]), Signed128::new(100));
        net_cash_deltas.insert(WalletId([2u8; 32]), Signed128::new(-100));

        let result = NettingResult {
            final_owners,
            net_cash_deltas,
            consumed_ids: intent_ids,
            skipped_ids: vec![],
            conservation: ConservationProof::check(Signed128::ZERO),
        };

        let mut item_games = BTreeMap::new();
        item_games.insert(ItemId("sword".into()), GameId::unscoped());
        BatchRepo::new(db).record_netted(&batch_id, 1_000, &result, &item_games).await.unwrap();
        batch_id
    }

    #[tokio::test]
    async fn commit_yields_a_pending_confirmation_receipt_not_settled() {
        let db = test_db().await;
        let config = test_config();
        let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new());
        let da: Arc<dyn DataAvailabilityStore> = Arc::new(InMemoryDaStore::new());
        let batch_id = netted_batch(&db).await;

        let committer = Committer::new(&db, &config, ledger, da);
        let outcome = committer.commit(&batch_id, 2_000).await.unwrap();

        match outcome {
            CommitOutcome::PendingConfirmation(receipt) => {
                assert_eq!(receipt.record.ledger_batch_id.0, 1);
                assert_eq!(receipt.record.num_items, 1);
            }
            CommitOutcome::AlreadySettled(_) => panic!("fresh commit must not skip confirmation"),
        }

        // commit() itself never advances past COMMITTED.
        assert_eq!(
            BatchRepo::new(&db).state(&batch_id).await.unwrap(),
            Some(BatchState::Committed)
        );
    }

    #[tokio::test]
    async fn finalize_settled_only_advances_from_committed() {
        let db = test_db().await;
        let config = test_config();
        let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new());
        let da: Arc<dyn DataAvailabilityStore> = Arc::new(InMemoryDaStore::new());
        let batch_id = netted_batch(&db).await;

        let committer = Committer::new(&db, &config, ledger, da);
        committer.commit(&batch_id, 2_000).await.unwrap();
        committer.finalize_settled(&batch_id).await.unwrap();

        assert_eq!(
            BatchRepo::new(&db).state(&batch_id).await.unwrap(),
            Some(BatchState::Settled)
        );

        // idempotent: calling again is a no-op, not an error.
        committer.finalize_settled(&batch_id).await.unwrap();
        assert_eq!(
            BatchRepo::new(&db).state(&batch_id).await.unwrap(),
            Some(BatchState::Settled)
        );
    }

    #[tokio::test]
    async fn recommitting_a_settled_batch_returns_the_stored_record_without_resubmitting() {
        let db = test_db().await;
        let config = test_config();
        let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new());
        let da: Arc<dyn DataAvailabilityStore> = Arc::new(InMemoryDaStore::new());
        let batch_id = netted_batch(&db).await;

        let committer = Committer::new(&db, &config, ledger.clone(), da);
        committer.commit(&batch_id, 2_000).await.unwrap();
        committer.finalize_settled(&batch_id).await.unwrap();

        let second = committer.commit(&batch_id, 3_000).await.unwrap();
        match second {
            CommitOutcome::AlreadySettled(record) => assert_eq!(record.ledger_batch_id.0, 1),
            CommitOutcome::PendingConfirmation(_) => panic!("must not resubmit a settled batch"),
        }
        assert_eq!(ledger.last_committed_batch_id().await.unwrap().0, 1);
    }

    #[tokio::test]
    async fn recommitting_a_committed_but_unfinalized_batch_reuses_the_stored_submission() {
        let db = test_db().await;
        let config = test_config();
        let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new());
        let da: Arc<dyn DataAvailabilityStore> = Arc::new(InMemoryDaStore::new());
        let batch_id = netted_batch(&db).await;

        let committer = Committer::new(&db, &config, ledger.clone(), da);
        let first = committer.commit(&batch_id, 2_000).await.unwrap();
        let first_tx_ref = match first {
            CommitOutcome::PendingConfirmation(r) => r.tx_ref,
            _ => panic!("expected pending confirmation"),
        };

        // Simulate a restart before finalize_settled ran: commit again
        // while still COMMITTED must not call ledger.submit a second
        // time (which would bump last_committed_batch_id to 2).
        let second = committer.commit(&batch_id, 4_000).await.unwrap();
        match second {
            CommitOutcome::PendingConfirmation(r) => assert_eq!(r.tx_ref, first_tx_ref),
            CommitOutcome::AlreadySettled(_) => panic!("not yet finalized"),
        }
        assert_eq!(ledger.last_committed_batch_id().await.unwrap().0, 1);
    }
}
