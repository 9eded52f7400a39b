//! Tessera Server — the unified binary: the read API plus the
//! background batch-forming, settlement, indexing, and watchdog
//! workers that drive batches through their lifecycle.
//!
//! Startup sequence: parse CLI/env config, init logging, connect to
//! the database and run migrations, spawn the background workers,
//! build the router, then serve with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tessera_api::AppState;
use tessera_batch::BatchManager;
use tessera_core::EngineConfig;
use tessera_db::{Database, DatabaseConfig};
use tessera_indexer::Indexer;
use tessera_resilience::{BrickMonitor, FakeConfirmationDetector, NetworkPartitionGuard};
use tessera_settlement::{CommitOutcome, Committer, DataAvailabilityStore, InMemoryDaStore, InMemoryLedger, SettlementLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = EngineConfig::parse();

    init_logging(&config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "starting tessera-server",
    );

    if let Err(e) = config.assert_startup_invariants() {
        tracing::error!(error = %e, "startup invariant violated");
        anyhow::bail!(e);
    }

    let db = Arc::new(Database::connect(&DatabaseConfig::new(config.database_url.clone())).await?);
    db.migrate().await?;
    tracing::info!("database connected and migrated");

    let ledger: Arc<dyn SettlementLedger> = Arc::new(InMemoryLedger::new());
    let da: Arc<dyn DataAvailabilityStore> = Arc::new(InMemoryDaStore::new());
    let config = Arc::new(config);

    let brick_monitor = Arc::new(BrickMonitor::new(config.circuit_breaker_k, config.circuit_breaker_window_seconds));
    let partition_guard = Arc::new(NetworkPartitionGuard::new(config.partition_guard_seconds));
    let confirmation_detector = Arc::new(FakeConfirmationDetector::new());

    let batch_former = tokio::spawn(run_batch_former(db.clone(), config.clone()));
    let committer = tokio::spawn(run_committer(
        db.clone(),
        config.clone(),
        ledger.clone(),
        da,
        brick_monitor,
        partition_guard.clone(),
        confirmation_detector,
    ));
    let indexer = tokio::spawn(run_indexer(db.clone(), ledger.clone()));
    let partition_watch = tokio::spawn(run_partition_watch(ledger, partition_guard));
    let retention = tokio::spawn(run_retention_sweep(db.clone(), config.clone()));

    let state = AppState::new(db, config.clone());
    let app = tessera_api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "read API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown signal received, stopping background workers");
    batch_former.abort();
    committer.abort();
    indexer.abort();
    partition_watch.abort();
    retention.abort();

    Ok(())
}

fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Poll the queue's window policy and form a batch whenever it's due.
/// Runs until the process shuts down.
async fn run_batch_former(db: Arc<Database>, config: Arc<EngineConfig>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now().timestamp();

        let queue = tessera_queue::IntentQueue::new(&db);
        let pending_count = match queue.pending_count().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read pending count");
                continue;
            }
        };
        let oldest_age = match queue.oldest_pending_age(now).await {
            Ok(age) => age.unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read oldest pending age");
                continue;
            }
        };

        if !tessera_batch::should_form_batch(oldest_age, pending_count, &config) {
            continue;
        }

        let manager = BatchManager::new(&db, &config);
        match manager.form_batch(now).await {
            Ok(Some(batch)) => tracing::info!(batch_id = %batch.batch_id, "formed batch"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "batch formation failed"),
        }
    }
}

/// Poll for `NETTED` batches and commit each to the settlement ledger,
/// guarded by the brick monitor and partition guard. Every submission
/// is verified by the fake-confirmation detector (C8) before the batch
/// is allowed to advance to `SETTLED`; a failed verification aborts
/// the batch instead of silently retrying it (spec.md §4.8/§7).
async fn run_committer(
    db: Arc<Database>,
    config: Arc<EngineConfig>,
    ledger: Arc<dyn SettlementLedger>,
    da: Arc<dyn DataAvailabilityStore>,
    brick_monitor: Arc<BrickMonitor>,
    partition_guard: Arc<NetworkPartitionGuard>,
    confirmation_detector: Arc<FakeConfirmationDetector>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;

        if partition_guard.check_partitioned().is_err() {
            tracing::warn!("network partition guard tripped, refusing commits");
            continue;
        }
        if brick_monitor.allow_commit().is_err() {
            continue;
        }

        let batches = tessera_db::BatchRepo::new(&db);
        let netted = match batches.netted_batch_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list netted batches");
                continue;
            }
        };

        for batch_id in netted {
            let now = chrono::Utc::now().timestamp();
            let committer = Committer::new(&db, &config, ledger.clone(), da.clone());
            match committer.commit(&batch_id, now).await {
                Ok(CommitOutcome::AlreadySettled(record)) => {
                    brick_monitor.record_success();
                    tracing::info!(batch_id = %batch_id, ledger_batch_id = record.ledger_batch_id.0, "batch already settled");
                }
                Ok(CommitOutcome::PendingConfirmation(receipt)) => {
                    confirmation_detector.record_submission(&receipt.tx_ref, receipt.confirmed_slot);
                    match confirmation_detector.verify_confirmation(&receipt.tx_ref, ledger.as_ref()).await {
                        Ok(_) => match committer.finalize_settled(&batch_id).await {
                            Ok(()) => {
                                brick_monitor.record_success();
                                tracing::info!(batch_id = %batch_id, ledger_batch_id = receipt.record.ledger_batch_id.0, "committed batch");
                            }
                            Err(e) => {
                                brick_monitor.record_failure();
                                tracing::warn!(batch_id = %batch_id, error = %e, "failed to finalize settled batch");
                            }
                        },
                        Err(e) => {
                            brick_monitor.record_failure();
                            tracing::error!(batch_id = %batch_id, error = %e, "fake confirmation detected, aborting batch");
                            abort_unconfirmed_batch(&db, &config, &batch_id).await;
                        }
                    }
                }
                Err(e) => {
                    brick_monitor.record_failure();
                    tracing::warn!(batch_id = %batch_id, error = %e, "commit failed");
                }
            }
        }
    }
}

/// `CONFIRMATION_FAKE`: abort the batch and return its intents to the
/// queue (or terminally skip them) per `requeue_skipped`, same exit
/// path as any other aborted batch.
async fn abort_unconfirmed_batch(db: &Database, config: &EngineConfig, batch_id: &tessera_types::BatchId) {
    let batches = tessera_db::BatchRepo::new(db);
    let mut ids = batches.consumed_intent_ids(batch_id).await.unwrap_or_default();
    ids.extend(batches.skipped_intent_ids(batch_id).await.unwrap_or_default());
    let manager = BatchManager::new(db, config);
    if let Err(e) = manager.abort(batch_id, &ids).await {
        tracing::warn!(batch_id = %batch_id, error = %e, "failed to abort unconfirmed batch");
    }
}

/// Subscribe to the ledger's settlement event stream and apply each
/// event to the shadow tables (C6), with a resync fallback on missed
/// events (a lagged broadcast receiver).
async fn run_indexer(db: Arc<Database>, ledger: Arc<dyn SettlementLedger>) {
    let mut events = ledger.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                let now = chrono::Utc::now().timestamp();
                let indexer = Indexer::new(&db);
                if let Err(e) = indexer.apply_event(&event, now).await {
                    tracing::warn!(error = %e, "failed to index settlement event");
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "indexer lagged the event stream, resyncing from cursor");
                let now = chrono::Utc::now().timestamp();
                let cursor = tessera_db::ProjectionRepo::new(&db).cursor().await.unwrap_or(tessera_types::LedgerBatchId(0));
                let indexer = Indexer::new(&db);
                if let Err(e) = indexer.resync(cursor, now).await {
                    tracing::warn!(error = %e, "resync failed");
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                tracing::warn!("settlement event stream closed, indexer stopping");
                return;
            }
        }
    }
}

/// Periodically observe the ledger's current slot so the partition
/// guard has a live signal even when no commit is in flight.
async fn run_partition_watch(ledger: Arc<dyn SettlementLedger>, guard: Arc<NetworkPartitionGuard>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        match ledger.current_slot().await {
            Ok(slot) => {
                let _ = guard.observe_slot(slot);
            }
            Err(e) => tracing::warn!(error = %e, "failed to read ledger slot"),
        }
    }
}

/// Evict replay-protection state past its TTL floor once an hour
/// (spec.md §4.2: nonce set ≥24h, processed-ids ≥7d — a retention
/// floor, not a correctness dependency, so an hourly cadence is ample).
async fn run_retention_sweep(db: Arc<Database>, config: Arc<EngineConfig>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now().timestamp();
        let queue = tessera_queue::IntentQueue::new(&db);
        match queue
            .prune_retention(now, config.nonce_ttl_seconds as i64, config.processed_id_ttl_seconds as i64)
            .await
        {
            Ok((nonces, processed)) => {
                if nonces > 0 || processed > 0 {
                    tracing::info!(nonces, processed, "pruned expired retention state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}
