//! Tessera Resilience — three watchdogs wrapping the settlement and
//! indexing I/O paths.
//!
//! `FakeConfirmationDetector` and `NetworkPartitionGuard` both refuse
//! to let a later observation contradict an earlier one — a batch
//! once seen confirmed at a given slot can never un-confirm, and the
//! chain's reported slot can never move backward. `BrickMonitor` is a
//! sliding-window failure counter with a probe-based cooldown. Errors
//! from any of the three are terminal for the affected batch; callers
//! must not retry them silently.

pub mod error;

pub use error::{ResilienceError, ResilienceResult};

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tessera_settlement::SettlementLedger;
use tessera_types::TxRef;
use tracing::warn;

/// Detects a ledger reporting a settlement as confirmed when its slot
/// has not actually advanced, or the tx is absent from the canonical
/// chain at the claimed slot.
pub struct FakeConfirmationDetector {
    submit_slots: DashMap<String, u64>,
    last_verified_slot: AtomicU64,
}

impl FakeConfirmationDetector {
    pub fn new() -> Self {
        Self {
            submit_slots: DashMap::new(),
            last_verified_slot: AtomicU64::new(0),
        }
    }

    /// Record the slot a settlement tx was submitted at, before
    /// awaiting confirmation.
    pub fn record_submission(&self, tx_ref: &TxRef, submit_slot: u64) {
        self.submit_slots.insert(tx_ref.0.clone(), submit_slot);
    }

    /// Verify a claimed confirmation against the ledger's own view of
    /// `tx_ref`'s slot. The slot must be present and must exceed the
    /// last slot this detector has ever accepted.
    pub async fn verify_confirmation(
        &self,
        tx_ref: &TxRef,
        ledger: &dyn SettlementLedger,
    ) -> ResilienceResult<u64> {
        let authoritative_slot = ledger
            .slot_for_tx(tx_ref)
            .await
            .ok()
            .flatten();

        let slot = match authoritative_slot {
            Some(slot) => slot,
            None => {
                warn!(tx_ref = %tx_ref, "tx absent from canonical chain at confirmation time");
                return Err(ResilienceError::FakeConfirmation);
            }
        };

        let last = self.last_verified_slot.load(Ordering::SeqCst);
        if slot <= last {
            warn!(tx_ref = %tx_ref, slot, last_verified = last, "confirmed slot did not advance monotonically");
            return Err(ResilienceError::FakeConfirmation);
        }

        self.last_verified_slot.store(slot, Ordering::SeqCst);
        self.submit_slots.remove(&tx_ref.0);
        Ok(slot)
    }
}

impl Default for FakeConfirmationDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Consecutive-or-windowed failure circuit breaker guarding the
/// committer. The cooldown reuses the same window the failure count
/// is measured over: once tripped, one probe commit is allowed
/// through after a full window has elapsed, and a
/// failed probe restarts the cooldown from that point.
pub struct BrickMonitor {
    k: u32,
    window: Duration,
    state: Mutex<BrickState>,
    consecutive_failures: AtomicU32,
}

struct BrickState {
    failures_in_window: VecDeque<Instant>,
    tripped_at: Option<Instant>,
    probing: bool,
}

impl BrickMonitor {
    pub fn new(k: u32, window_seconds: u64) -> Self {
        Self {
            k,
            window: Duration::from_secs(window_seconds),
            state: Mutex::new(BrickState {
                failures_in_window: VecDeque::new(),
                tripped_at: None,
                probing: false,
            }),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Whether a commit attempt may proceed right now. Tripped circuits
    /// refuse every commit until the cooldown elapses, at which point
    /// exactly one probe is let through — `probing` itself, not just
    /// the elapsed check, gates this so two concurrent callers racing
    /// past a just-expired cooldown can't both be granted a probe.
    pub fn allow_commit(&self) -> ResilienceResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.tripped_at {
            None => Ok(()),
            Some(at) if !state.probing && at.elapsed() >= self.window => {
                state.probing = true;
                Ok(())
            }
            Some(_) => Err(ResilienceError::CircuitTripped),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.failures_in_window.clear();
        state.tripped_at = None;
        state.probing = false;
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        let mut state = self.state.lock().unwrap();
        state.failures_in_window.push_back(now);
        while let Some(&front) = state.failures_in_window.front() {
            if now.duration_since(front) > self.window {
                state.failures_in_window.pop_front();
            } else {
                break;
            }
        }

        if state.probing {
            state.probing = false;
            state.tripped_at = Some(now);
            warn!("probe commit failed, circuit remains tripped");
            return;
        }

        let windowed = state.failures_in_window.len() as u32;
        if consecutive >= self.k || windowed >= self.k {
            if state.tripped_at.is_none() {
                warn!(consecutive, windowed, k = self.k, "circuit breaker tripped");
            }
            state.tripped_at = Some(now);
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.state.lock().unwrap().tripped_at.is_some()
    }
}

/// Declares `PARTITIONED` when the ledger's observed slot has not
/// advanced in longer than the guard window. Intents keep being
/// accepted while partitioned; only commits are refused.
pub struct NetworkPartitionGuard {
    guard_window: Duration,
    last_slot: AtomicU64,
    last_advance: Mutex<Instant>,
}

impl NetworkPartitionGuard {
    pub fn new(guard_window_seconds: u64) -> Self {
        Self {
            guard_window: Duration::from_secs(guard_window_seconds),
            last_slot: AtomicU64::new(0),
            last_advance: Mutex::new(Instant::now()),
        }
    }

    /// Record the ledger's current slot as observed just now. Returns
    /// `Err(Partitioned)` if the slot has been stuck for longer than
    /// the guard window; commits should be refused in that case even
    /// though this call itself does not fail loudly on a fresh stall.
    pub fn observe_slot(&self, slot: u64) -> ResilienceResult<()> {
        let previous = self.last_slot.load(Ordering::SeqCst);
        if slot > previous {
            self.last_slot.store(slot, Ordering::SeqCst);
            *self.last_advance.lock().unwrap() = Instant::now();
            return Ok(());
        }
        self.check_partitioned()
    }

    pub fn check_partitioned(&self) -> ResilienceResult<()> {
        let stalled_for = self.last_advance.lock().unwrap().elapsed();
        if stalled_for > self.guard_window {
            return Err(ResilienceError::Partitioned);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tessera_types::LedgerBatchId;

    struct FakeLedger {
        slot_for_tx: Option<u64>,
    }

    #[async_trait]
    impl SettlementLedger for FakeLedger {
        async fn last_committed_batch_id(&self) -> anyhow::Result<LedgerBatchId> {
            Ok(LedgerBatchId(0))
        }
        async fn submit(
            &self,
            _next: LedgerBatchId,
            _merkle_root: [u8; 32],
            _da_hash: [u8; 32],
            _num_intents: u64,
            _num_items: u64,
        ) -> anyhow::Result<tessera_settlement::LedgerSubmission> {
            unimplemented!()
        }
        async fn slot_for_tx(&self, _tx_ref: &TxRef) -> anyhow::Result<Option<u64>> {
            Ok(self.slot_for_tx)
        }
        async fn current_slot(&self) -> anyhow::Result<u64> {
            Ok(self.slot_for_tx.unwrap_or(0))
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<tessera_settlement::SettlementEvent> {
            let (tx, rx) = tokio::sync::broadcast::channel(1);
            std::mem::forget(tx);
            rx
        }
    }

    #[tokio::test]
    async fn accepts_a_monotonically_advancing_slot() {
        let detector = FakeConfirmationDetector::new();
        let ledger = FakeLedger { slot_for_tx: Some(10) };
        let tx = TxRef("tx-1".into());
        detector.record_submission(&tx, 5);
        assert_eq!(detector.verify_confirmation(&tx, &ledger).await, Ok(10));
    }

    #[tokio::test]
    async fn rejects_a_non_advancing_slot() {
        let detector = FakeConfirmationDetector::new();
        let ledger = FakeLedger { slot_for_tx: Some(10) };
        let tx = TxRef("tx-1".into());
        detector.verify_confirmation(&tx, &ledger).await.unwrap();

        let stale_ledger = FakeLedger { slot_for_tx: Some(10) };
        let tx2 = TxRef("tx-2".into());
        assert_eq!(
            detector.verify_confirmation(&tx2, &stale_ledger).await,
            Err(ResilienceError::FakeConfirmation)
        );
    }

    #[tokio::test]
    async fn rejects_a_tx_absent_from_the_chain() {
        let detector = FakeConfirmationDetector::new();
        let ledger = FakeLedger { slot_for_tx: None };
        let tx = TxRef("tx-1".into());
        assert_eq!(
            detector.verify_confirmation(&tx, &ledger).await,
            Err(ResilienceError::FakeConfirmation)
        );
    }

    #[test]
    fn trips_after_k_consecutive_failures() {
        let monitor = BrickMonitor::new(3, 60);
        assert!(monitor.allow_commit().is_ok());
        monitor.record_failure();
        monitor.record_failure();
        assert!(!monitor.is_tripped());
        monitor.record_failure();
        assert!(monitor.is_tripped());
        assert!(monitor.allow_commit().is_err());
    }

    #[test]
    fn only_one_probe_is_granted_per_cooldown_even_if_checked_twice() {
        let monitor = BrickMonitor::new(1, 0);
        monitor.record_failure();
        assert!(monitor.is_tripped());

        // Cooldown window is 0s, so it has already elapsed.
        assert!(monitor.allow_commit().is_ok(), "first caller gets the probe");
        assert!(
            monitor.allow_commit().is_err(),
            "a second caller must not get a probe while the first is still outstanding"
        );
    }

    #[test]
    fn success_resets_the_consecutive_counter() {
        let monitor = BrickMonitor::new(3, 60);
        monitor.record_failure();
        monitor.record_failure();
        monitor.record_success();
        monitor.record_failure();
        monitor.record_failure();
        assert!(!monitor.is_tripped());
    }

    #[test]
    fn partition_guard_trips_once_stall_exceeds_the_window() {
        let guard = NetworkPartitionGuard::new(0);
        guard.observe_slot(1).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(guard.check_partitioned(), Err(ResilienceError::Partitioned));
    }

    #[test]
    fn partition_guard_stays_healthy_while_slot_advances() {
        let guard = NetworkPartitionGuard::new(120);
        guard.observe_slot(1).unwrap();
        guard.observe_slot(2).unwrap();
        assert!(guard.check_partitioned().is_ok());
    }
}
