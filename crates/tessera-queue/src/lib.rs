//! Tessera Queue — the durable intent queue.
//!
//! Wraps `tessera_db::IntentRepo` with a fixed check ordering:
//! duplicate-id and nonce-reuse checks happen before the policy gate
//! runs, so a replayed intent never touches (and never re-spends) a
//! session's cap.

pub mod error;

pub use error::{QueueError, QueueResult};

use tessera_db::{BatchRepo, Database, IntentRepo};
use tessera_policy::PolicyGate;
use tessera_types::{BatchId, IntentId, TradeIntent};

pub struct IntentQueue<'a> {
    db: &'a Database,
}

impl<'a> IntentQueue<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// `Submit(intent) -> Accepted | Rejected(reason)`.
    pub async fn submit(&self, gate: &PolicyGate<'_>, intent: &TradeIntent, now: i64) -> QueueResult<()> {
        let repo = IntentRepo::new(self.db);

        if repo.id_is_known(&intent.id).await? {
            return Err(QueueError::DuplicateId);
        }
        if repo.nonce_used(&intent.session, intent.nonce).await? {
            return Err(QueueError::NonceReused);
        }

        gate.validate(intent, now)
            .await
            .map_err(|e| QueueError::Policy(e.reject_reason()))?;

        repo.enqueue(intent).await?;
        Ok(())
    }

    /// `Peek(max_count, max_age) -> []Intent`, FIFO, excluding intents
    /// already locked by id and intents whose item is already claimed by
    /// another in-flight batch (the cross-batch `locked_items` guard).
    pub async fn peek(&self, now: i64, max_age: i64, max_count: i64) -> QueueResult<Vec<TradeIntent>> {
        Ok(IntentRepo::new(self.db).peek(now, max_age, max_count).await?)
    }

    pub async fn pending_count(&self) -> QueueResult<i64> {
        Ok(IntentRepo::new(self.db).pending_count().await?)
    }

    /// Age of the oldest pending intent, in seconds, or `None` if the
    /// queue is empty — feeds the batch window policy.
    pub async fn oldest_pending_age(&self, now: i64) -> QueueResult<Option<i64>> {
        Ok(IntentRepo::new(self.db).oldest_pending_age(now).await?)
    }

    /// `Lock(intents[]) -> batch_handle`: claims the given ids for
    /// `batch_id`, skipping any concurrently claimed elsewhere.
    pub async fn lock(&self, batch_id: &BatchId, intent_ids: &[IntentId]) -> QueueResult<Vec<IntentId>> {
        Ok(IntentRepo::new(self.db)
            .lock_batch(&batch_id.to_string(), intent_ids)
            .await?)
    }

    /// `Finalise(batch_handle, COMMITTED|SETTLED)`: retire the consumed
    /// and skipped ids from this batch into the processed set, releasing
    /// its claim on `locked_items`.
    pub async fn finalise_settled(&self, batch_id: &BatchId, now: i64) -> QueueResult<()> {
        let batches = BatchRepo::new(self.db);
        let mut ids = batches.consumed_intent_ids(batch_id).await?;
        ids.extend(batches.skipped_intent_ids(batch_id).await?);
        IntentRepo::new(self.db)
            .finalise_settled(&batch_id.to_string(), &ids, now)
            .await?;
        Ok(())
    }

    /// `Finalise(batch_handle, ABORTED)`: unlock every intent originally
    /// claimed for this batch, honoring `requeue_skipped`, and release
    /// its claim on `locked_items`.
    pub async fn finalise_aborted(
        &self,
        batch_id: &BatchId,
        intent_ids: &[IntentId],
        requeue_skipped: bool,
    ) -> QueueResult<()> {
        IntentRepo::new(self.db)
            .abort_batch(&batch_id.to_string(), intent_ids, requeue_skipped)
            .await?;
        Ok(())
    }

    /// Evict replay-protection state past its retention floor:
    /// `(session, nonce)` pairs older than `nonce_ttl_seconds`, and
    /// processed intent ids older than `processed_id_ttl_seconds`
    /// (spec.md §4.2's "TTLs may expire data outside these windows").
    /// Returns `(nonces_pruned, processed_ids_pruned)`.
    pub async fn prune_retention(&self, now: i64, nonce_ttl_seconds: i64, processed_id_ttl_seconds: i64) -> QueueResult<(u64, u64)> {
        let repo = IntentRepo::new(self.db);
        let nonces = repo.prune_nonces(now - nonce_ttl_seconds).await?;
        let processed = repo.prune_processed_ids(now - processed_id_ttl_seconds).await?;
        Ok((nonces, processed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use tessera_core::{DaProvider, EngineConfig, OverflowPolicy};
    use tessera_db::DatabaseConfig;
    use tessera_db::PolicyRepo;
    use tessera_types::{Amount, IntentAction, ItemId, OwnerId, SessionKeyPolicy, WalletId};

    async fn test_db() -> Database {
        let db = Database::connect(&DatabaseConfig::new("sqlite::memory:"))
            .await
            .unwrap();
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

    fn signed_intent(signing_key: &SigningKey, owner: OwnerId, id: &str, nonce: u64) -> TradeIntent {
        let mut intent = TradeIntent {
            id: IntentId(id.to_string()),
            session: tessera_types::SessionId(signing_key.verifying_key().to_bytes()),
            owner,
            item: ItemId("sword-1".into()),
            from: WalletId([1u8; 32]),
            to: WalletId([2u8; 32]),
            amount: Amount::new(10),
            nonce,
            signature: String::new(),
            created_at: 1000,
            game: None,
            listing: None,
            action: IntentAction::Trade,
        };
        let sig = signing_key.sign(&tessera_crypto::canonical::signable_bytes(&intent));
        intent.signature = base64::engine::general_purpose::STANDARD.encode(sig.to_bytes());
        intent
    }

    #[tokio::test]
    async fn submit_then_peek_returns_the_intent() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 2000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        let intent = signed_intent(&signing_key, owner, "i-1", 1);

        queue.submit(&gate, &intent, 1000).await.unwrap();
        let peeked = queue.peek(1000, 10_000, 10).await.unwrap();
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].id, intent.id);
    }

    #[tokio::test]
    async fn resubmitting_same_id_is_rejected() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 2000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        let intent = signed_intent(&signing_key, owner, "i-1", 1);

        queue.submit(&gate, &intent, 1000).await.unwrap();
        let second = queue.submit(&gate, &intent, 1000).await;
        assert_eq!(second, Err(QueueError::DuplicateId));
    }

    #[tokio::test]
    async fn lock_claims_each_intent_at_most_once() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 2000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        let intent = signed_intent(&signing_key, owner, "i-1", 1);
        queue.submit(&gate, &intent, 1000).await.unwrap();

        let batch_a = BatchId::new();
        let batch_b = BatchId::new();
        let claimed_a = queue.lock(&batch_a, &[intent.id.clone()]).await.unwrap();
        let claimed_b = queue.lock(&batch_b, &[intent.id.clone()]).await.unwrap();

        assert_eq!(claimed_a, vec![intent.id.clone()]);
        assert!(claimed_b.is_empty());
    }

    #[tokio::test]
    async fn a_second_intent_on_the_same_item_cannot_join_a_second_batch() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 2000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        // Two distinct intent ids trading the same item — a row lock
        // alone would let both be claimed into different batches.
        let first = signed_intent(&signing_key, owner.clone(), "i-1", 1);
        let second = signed_intent(&signing_key, owner, "i-2", 2);
        queue.submit(&gate, &first, 1000).await.unwrap();
        queue.submit(&gate, &second, 1000).await.unwrap();

        let batch_a = BatchId::new();
        let batch_b = BatchId::new();
        let claimed_a = queue.lock(&batch_a, &[first.id.clone()]).await.unwrap();
        let claimed_b = queue.lock(&batch_b, &[second.id.clone()]).await.unwrap();

        assert_eq!(claimed_a, vec![first.id.clone()]);
        assert!(claimed_b.is_empty(), "second batch must not claim an item already locked by the first");

        // peek must also exclude the still-unlocked second intent, since
        // its item is claimed by batch_a.
        let pending = queue.peek(1000, 10_000, 10).await.unwrap();
        assert!(pending.is_empty());

        // Once batch_a settles, the item frees up for a later batch.
        queue.finalise_settled(&batch_a, 1000).await.unwrap();
        let claimed_after_settle = queue.lock(&batch_b, &[second.id.clone()]).await.unwrap();
        assert_eq!(claimed_after_settle, vec![second.id.clone()]);
    }

    #[tokio::test]
    async fn replaying_a_session_nonce_is_rejected() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 2000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        let first = signed_intent(&signing_key, owner.clone(), "i-1", 1);
        queue.submit(&gate, &first, 1000).await.unwrap();

        let replay = signed_intent(&signing_key, owner, "i-2", 1);
        let result = queue.submit(&gate, &replay, 1000).await;
        assert_eq!(result, Err(QueueError::NonceReused));
    }

    #[tokio::test]
    async fn prune_retention_evicts_only_rows_past_their_ttl() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        PolicyRepo::new(&db)
            .register(&SessionKeyPolicy {
                owner: owner.clone(),
                session,
                cap: Amount::new(1000),
                expiry: 10_000,
                allowed_actions: vec![IntentAction::Trade],
                created_at: 500,
            })
            .await
            .unwrap();

        let gate = PolicyGate::new(&db, &config);
        let queue = IntentQueue::new(&db);
        let old_intent = signed_intent(&signing_key, owner, "i-old", 1);
        queue.submit(&gate, &old_intent, 1000).await.unwrap();

        let now = 1_000_000;
        let (nonces_pruned, _) = queue.prune_retention(now, 86_400, 604_800).await.unwrap();
        // i-old's nonce (created_at 1000) is far past an 86_400s TTL at now=1_000_000.
        assert_eq!(nonces_pruned, 1);

        // At now=1010, the same row is still well inside the TTL.
        let (nonces_pruned_2, _) = queue.prune_retention(1010, 86_400, 604_800).await.unwrap();
        assert_eq!(nonces_pruned_2, 0);
    }
}
