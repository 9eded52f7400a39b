//! External collaborator traits: the settlement ledger and the
//! data-availability store, plus in-memory reference implementations.
//!
//! Production code depends only on the trait; tests run against the
//! in-memory fake.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tessera_types::{LedgerBatchId, TxRef};

/// What the ledger hands back once a submission is included on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSubmission {
    pub tx_ref: TxRef,
    pub confirmed_slot: u64,
}

/// One committed-settlement event from the ledger's subscription feed:
/// `(batch_id, root, da_hash, num_intents, num_items, slot, timestamp)`.
/// The shadow indexer is the sole consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    pub ledger_batch_id: LedgerBatchId,
    pub merkle_root: [u8; 32],
    pub da_hash: [u8; 32],
    pub num_intents: u64,
    pub num_items: u64,
    pub slot: u64,
    pub timestamp: i64,
}

#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn last_committed_batch_id(&self) -> anyhow::Result<LedgerBatchId>;

    /// Submit `(next, root, da_hash, num_intents, num_items)` signed by
    /// the operator authority; returns once included.
    async fn submit(
        &self,
        next: LedgerBatchId,
        merkle_root: [u8; 32],
        da_hash: [u8; 32],
        num_intents: u64,
        num_items: u64,
    ) -> anyhow::Result<LedgerSubmission>;

    /// The ledger's authoritative slot for a previously submitted tx,
    /// used by the fake-confirmation detector.
    async fn slot_for_tx(&self, tx_ref: &TxRef) -> anyhow::Result<Option<u64>>;

    /// Last slot the ledger has observed at all, for the partition guard.
    async fn current_slot(&self) -> anyhow::Result<u64>;

    /// Subscribe to the ledger's committed-settlement event stream.
    /// Each `submit` that commits publishes exactly one event here.
    fn subscribe(&self) -> broadcast::Receiver<SettlementEvent>;
}

#[async_trait]
pub trait DataAvailabilityStore: Send + Sync {
    /// Write `payload`, returning a store-assigned identifier (opaque
    /// unless the store is content-addressed, in which case callers
    /// should prefer hashing `payload` directly).
    async fn write(&self, payload: &[u8]) -> anyhow::Result<String>;
}

/// In-memory ledger fake: a single monotonic sequence, content keyed by
/// `LedgerBatchId`, a per-tx slot ledger for the confirmation detector.
pub struct InMemoryLedger {
    last_committed: AtomicU64,
    slots: DashMap<String, u64>,
    slot_clock: AtomicU64,
    events: broadcast::Sender<SettlementEvent>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            last_committed: AtomicU64::new(0),
            slots: DashMap::new(),
            slot_clock: AtomicU64::new(0),
            events,
        }
    }

    /// Test hook: advance the chain's observed slot without a submission.
    pub fn tick_slot(&self) -> u64 {
        self.slot_clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementLedger for InMemoryLedger {
    async fn last_committed_batch_id(&self) -> anyhow::Result<LedgerBatchId> {
        Ok(LedgerBatchId(self.last_committed.load(Ordering::SeqCst)))
    }

    async fn submit(
        &self,
        next: LedgerBatchId,
        merkle_root: [u8; 32],
        da_hash: [u8; 32],
        num_intents: u64,
        num_items: u64,
    ) -> anyhow::Result<LedgerSubmission> {
        let expected = self.last_committed.load(Ordering::SeqCst) + 1;
        if next.0 != expected {
            anyhow::bail!("sequence mismatch: submitted {} expected {}", next.0, expected);
        }
        self.last_committed.store(next.0, Ordering::SeqCst);
        let slot = self.tick_slot();
        let tx_ref = TxRef(format!("ledger-tx-{}", next.0));
        self.slots.insert(tx_ref.0.clone(), slot);

        // A `send` error just means no one is subscribed yet; the event
        // is not durable on this fake and that is fine for tests.
        let _ = self.events.send(SettlementEvent {
            ledger_batch_id: next,
            merkle_root,
            da_hash,
            num_intents,
            num_items,
            slot,
            timestamp: slot as i64,
        });

        Ok(LedgerSubmission { tx_ref, confirmed_slot: slot })
    }

    async fn slot_for_tx(&self, tx_ref: &TxRef) -> anyhow::Result<Option<u64>> {
        Ok(self.slots.get(&tx_ref.0).map(|s| *s))
    }

    async fn current_slot(&self) -> anyhow::Result<u64> {
        Ok(self.slot_clock.load(Ordering::SeqCst))
    }

    fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.events.subscribe()
    }
}

/// In-memory DA fake, content-addressed by SHA-256 of the payload.
#[derive(Default)]
pub struct InMemoryDaStore {
    objects: DashMap<String, Vec<u8>>,
}

impl InMemoryDaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataAvailabilityStore for InMemoryDaStore {
    async fn write(&self, payload: &[u8]) -> anyhow::Result<String> {
        let id = hex::encode(tessera_crypto::merkle::sha256(payload));
        self.objects.insert(id.clone(), payload.to_vec());
        Ok(id)
    }
}
