//! Tessera Policy — the signature and policy gate.
//!
//! `validate` runs seven ordered checks and leaves no state change
//! behind on any failure; only the final, atomic spend increment
//! (step 7) mutates anything, and it happens at most once per call.

pub mod error;

pub use error::{PolicyError, PolicyResult};

use tessera_core::EngineConfig;
use tessera_crypto::signature::verify_intent;
use tessera_db::{Database, PolicyRepo};
use tessera_types::{SessionKeyPolicy, TradeIntent};
use tracing::warn;

pub struct PolicyGate<'a> {
    db: &'a Database,
    config: &'a EngineConfig,
}

impl<'a> PolicyGate<'a> {
    pub fn new(db: &'a Database, config: &'a EngineConfig) -> Self {
        Self { db, config }
    }

    /// Validate `intent` against the signature and session-policy gate,
    /// returning the matched policy on success.
    pub async fn validate(&self, intent: &TradeIntent, now: i64) -> PolicyResult<SessionKeyPolicy> {
        if !intent.is_well_formed() {
            return Err(PolicyError::Malformed);
        }

        if self.config.disable_signature_verification {
            warn!("signature verification is disabled by configuration");
        } else {
            verify_intent(intent).map_err(|_| PolicyError::BadSignature)?;
        }

        let repo = PolicyRepo::new(self.db);

        let policy = repo
            .lookup(&intent.owner, &intent.session)
            .await?
            .ok_or(PolicyError::NoPolicy)?;

        if !policy.is_live(now) {
            return Err(PolicyError::Expired);
        }

        if !policy.allows(intent.action) {
            return Err(PolicyError::ActionNotAllowed);
        }

        let applied = repo
            .try_increment_spent(&intent.owner, &intent.session, intent.amount, policy.cap)
            .await?;

        if !applied {
            return Err(PolicyError::OverCap);
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use tessera_db::DatabaseConfig;
    use tessera_types::{Amount, IntentAction, IntentId, ItemId, OwnerId, WalletId};

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
            da_provider: tessera_core::DaProvider::ContentAddressed,
            ledger_confirmation_timeout_seconds: 30,
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

    fn signed_intent(signing_key: &SigningKey, owner: OwnerId, amount: u128, nonce: u64) -> TradeIntent {
        let mut intent = TradeIntent {
            id: IntentId(format!("i-{nonce}")),
            session: tessera_types::SessionId(signing_key.verifying_key().to_bytes()),
            owner,
            item: ItemId("sword-1".into()),
            from: WalletId([1u8; 32]),
            to: WalletId([2u8; 32]),
            amount: Amount::new(amount),
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
    async fn accepts_well_formed_intent_within_cap() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        let policy = SessionKeyPolicy {
            owner: owner.clone(),
            session: session.clone(),
            cap: Amount::new(1000),
            expiry: 2000,
            allowed_actions: vec![IntentAction::Trade],
            created_at: 500,
        };
        PolicyRepo::new(&db).register(&policy).await.unwrap();

        let intent = signed_intent(&signing_key, owner, 100, 1);
        let gate = PolicyGate::new(&db, &config);
        assert!(gate.validate(&intent, 1000).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_over_cap() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        let policy = SessionKeyPolicy {
            owner: owner.clone(),
            session: session.clone(),
            cap: Amount::new(50),
            expiry: 2000,
            allowed_actions: vec![IntentAction::Trade],
            created_at: 500,
        };
        PolicyRepo::new(&db).register(&policy).await.unwrap();

        let intent = signed_intent(&signing_key, owner, 100, 1);
        let gate = PolicyGate::new(&db, &config);
        assert_eq!(gate.validate(&intent, 1000).await, Err(PolicyError::OverCap));
    }

    #[tokio::test]
    async fn rejects_expired_policy() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);
        let session = tessera_types::SessionId(signing_key.verifying_key().to_bytes());

        let policy = SessionKeyPolicy {
            owner: owner.clone(),
            session: session.clone(),
            cap: Amount::new(1000),
            expiry: 500,
            allowed_actions: vec![IntentAction::Trade],
            created_at: 100,
        };
        PolicyRepo::new(&db).register(&policy).await.unwrap();

        let intent = signed_intent(&signing_key, owner, 100, 1);
        let gate = PolicyGate::new(&db, &config);
        assert_eq!(gate.validate(&intent, 1000).await, Err(PolicyError::Expired));
    }

    #[tokio::test]
    async fn rejects_missing_policy() {
        let db = test_db().await;
        let config = test_config();
        let signing_key = SigningKey::generate(&mut OsRng);
        let owner = OwnerId([9u8; 32]);

        let intent = signed_intent(&signing_key, owner, 100, 1);
        let gate = PolicyGate::new(&db, &config);
        assert_eq!(gate.validate(&intent, 1000).await, Err(PolicyError::NoPolicy));
    }
}
