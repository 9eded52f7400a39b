//! Netting batch header and result persistence.
//!
//! `commit` writes the batch header, the per-intent consumed/skipped
//! membership, the settled-item map, and the net cash deltas in one
//! transaction, so a reader never observes a batch whose result rows
//! exist without its header (or vice versa).

use crate::error::DbResult;
use crate::Database;
use sqlx::Row;
use std::collections::BTreeMap;
use tessera_types::{
    BatchId, BatchState, IntentId, ItemId, LedgerBatchId, NettingBatch, NettingResult, Signed128,
    TxRef, WalletId,
};

/// Everything the read API (C7) needs to answer `GET /batch/{id}`.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub state: BatchState,
    pub created_at: i64,
    pub netted_at: Option<i64>,
    pub ledger_batch_id: Option<LedgerBatchId>,
    pub tx_ref: Option<TxRef>,
    pub merkle_root: Option<String>,
    pub da_hash: Option<String>,
    pub num_intents: Option<u64>,
    pub num_items: Option<u64>,
    pub num_wallets: Option<u64>,
    pub conservation_verified: Option<bool>,
}

pub struct BatchRepo<'a> {
    db: &'a Database,
}

impl<'a> BatchRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, batch: &NettingBatch) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;

        sqlx::query(
            "INSERT INTO netting_batches (batch_id, created_at, state) VALUES (?, ?, ?)",
        )
        .bind(batch.batch_id.to_string())
        .bind(batch.created_at)
        .bind(state_str(batch.state))
        .execute(&mut *tx)
        .await?;

        for id in &batch.intent_ids {
            sqlx::query(
                "INSERT INTO batch_intents (batch_id, intent_id, consumed) VALUES (?, ?, 0)",
            )
            .bind(batch.batch_id.to_string())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Record the netting result and move the header to `Netted`.
    ///
    /// `item_games` resolves each settled item to the `game` namespace
    /// it belongs to (`GameId::unscoped()` for items no intent in this
    /// batch tagged), since `NettingResult` itself only tracks final
    /// owners, not namespaces.
    pub async fn record_netted(
        &self,
        batch_id: &BatchId,
        netted_at: i64,
        result: &NettingResult,
        item_games: &BTreeMap<ItemId, tessera_types::GameId>,
    ) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;

        sqlx::query(
            "UPDATE netting_batches SET
                state = ?, netted_at = ?, num_intents = ?, num_items = ?, num_wallets = ?,
                conservation_net_sum = ?, conservation_verified = ?
             WHERE batch_id = ?",
        )
        .bind(state_str(BatchState::Netted))
        .bind(netted_at)
        .bind(result.num_intents() as i64)
        .bind(result.num_items() as i64)
        .bind(result.num_wallets() as i64)
        .bind(result.conservation.net_sum.0.to_string())
        .bind(result.conservation.verified as i64)
        .bind(batch_id.to_string())
        .execute(&mut *tx)
        .await?;

        for id in &result.consumed_ids {
            sqlx::query("UPDATE batch_intents SET consumed = 1 WHERE batch_id = ? AND intent_id = ?")
                .bind(batch_id.to_string())
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }

        let unscoped = tessera_types::GameId::unscoped();
        for (item, owner) in &result.final_owners {
            let game = item_games.get(item).unwrap_or(&unscoped);
            sqlx::query(
                "INSERT INTO settled_items (batch_id, item, final_owner, game) VALUES (?, ?, ?, ?)
                 ON CONFLICT(batch_id, item) DO UPDATE SET
                    final_owner = excluded.final_owner, game = excluded.game",
            )
            .bind(batch_id.to_string())
            .bind(&item.0)
            .bind(owner.to_string())
            .bind(&game.0)
            .execute(&mut *tx)
            .await?;
        }

        for (wallet, delta) in &result.net_cash_deltas {
            sqlx::query(
                "INSERT INTO net_cash_deltas (batch_id, wallet, delta) VALUES (?, ?, ?)
                 ON CONFLICT(batch_id, wallet) DO UPDATE SET delta = excluded.delta",
            )
            .bind(batch_id.to_string())
            .bind(wallet.to_string())
            .bind(delta.0.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn record_committed(
        &self,
        batch_id: &BatchId,
        ledger_batch_id: LedgerBatchId,
        tx_ref: &TxRef,
        batch_hash: [u8; 32],
        da_hash: [u8; 32],
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE netting_batches SET state = ?, ledger_batch_id = ?, tx_ref = ?, batch_hash = ?, da_hash = ?
             WHERE batch_id = ?",
        )
        .bind(state_str(BatchState::Committed))
        .bind(ledger_batch_id.0 as i64)
        .bind(&tx_ref.0)
        .bind(hex::encode(batch_hash))
        .bind(hex::encode(da_hash))
        .bind(batch_id.to_string())
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    pub async fn set_state(&self, batch_id: &BatchId, state: BatchState) -> DbResult<()> {
        sqlx::query("UPDATE netting_batches SET state = ? WHERE batch_id = ?")
            .bind(state_str(state))
            .bind(batch_id.to_string())
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    pub async fn state(&self, batch_id: &BatchId) -> DbResult<Option<BatchState>> {
        let row = sqlx::query("SELECT state FROM netting_batches WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.map(|r| parse_state(&r.try_get::<String, _>("state").unwrap_or_default())))
    }

    /// The batch-summary read the API surface (C7) exposes: everything
    /// about a batch's lifecycle and its settlement receipt in one row.
    pub async fn summary(&self, batch_id: &BatchId) -> DbResult<Option<BatchSummary>> {
        let row = sqlx::query(
            "SELECT state, created_at, netted_at, ledger_batch_id, tx_ref, batch_hash, da_hash,
                    num_intents, num_items, num_wallets, conservation_verified
             FROM netting_batches WHERE batch_id = ?",
        )
        .bind(batch_id.to_string())
        .fetch_optional(&self.db.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(BatchSummary {
            state: parse_state(&row.try_get::<String, _>("state")?),
            created_at: row.try_get("created_at")?,
            netted_at: row.try_get("netted_at")?,
            ledger_batch_id: row
                .try_get::<Option<i64>, _>("ledger_batch_id")?
                .map(|id| LedgerBatchId(id as u64)),
            tx_ref: row.try_get::<Option<String>, _>("tx_ref")?.map(TxRef),
            merkle_root: row.try_get::<Option<String>, _>("batch_hash")?,
            da_hash: row.try_get::<Option<String>, _>("da_hash")?,
            num_intents: row.try_get::<Option<i64>, _>("num_intents")?.map(|n| n as u64),
            num_items: row.try_get::<Option<i64>, _>("num_items")?.map(|n| n as u64),
            num_wallets: row.try_get::<Option<i64>, _>("num_wallets")?.map(|n| n as u64),
            conservation_verified: row
                .try_get::<Option<i64>, _>("conservation_verified")?
                .map(|v| v != 0),
        }))
    }

    /// Strong match for the indexer: the batch whose header carries
    /// this exact `ledger_batch_id`.
    pub async fn find_by_ledger_batch_id(&self, ledger_batch_id: u64) -> DbResult<Option<BatchId>> {
        let row = sqlx::query(
            "SELECT batch_id FROM netting_batches WHERE ledger_batch_id = ? AND state = ?",
        )
        .bind(ledger_batch_id as i64)
        .bind(state_str(BatchState::Settled))
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(|r| parse_batch_id(&r.try_get::<String, _>("batch_id").unwrap_or_default())))
    }

    /// Pragmatic fallback match: a `SETTLED`-awaiting-index batch whose
    /// consumed/item counts agree with the event.
    pub async fn find_settled_by_counts(&self, num_intents: u64, num_items: u64) -> DbResult<Option<BatchId>> {
        let row = sqlx::query(
            "SELECT batch_id FROM netting_batches
             WHERE state = ? AND num_intents = ? AND num_items = ? AND ledger_batch_id IS NULL
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(state_str(BatchState::Settled))
        .bind(num_intents as i64)
        .bind(num_items as i64)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(|r| parse_batch_id(&r.try_get::<String, _>("batch_id").unwrap_or_default())))
    }

    /// `NETTED` batches awaiting commit, oldest first — what the
    /// settlement worker (C5) polls.
    pub async fn netted_batch_ids(&self) -> DbResult<Vec<BatchId>> {
        let rows = sqlx::query(
            "SELECT batch_id FROM netting_batches WHERE state = ? ORDER BY netted_at ASC",
        )
        .bind(state_str(BatchState::Netted))
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| parse_batch_id(&r.try_get::<String, _>("batch_id").unwrap_or_default()))
            .collect())
    }

    pub async fn ledger_batch_id(&self, batch_id: &BatchId) -> DbResult<Option<LedgerBatchId>> {
        let row = sqlx::query("SELECT ledger_batch_id FROM netting_batches WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.and_then(|r| r.try_get::<Option<i64>, _>("ledger_batch_id").ok().flatten())
            .map(|id| LedgerBatchId(id as u64)))
    }

    /// `SETTLED` batches with a known ledger sequence number at or after
    /// `from`, in ledger order — the resync-from-cursor feed.
    pub async fn settled_since(&self, from: LedgerBatchId) -> DbResult<Vec<(BatchId, LedgerBatchId)>> {
        let rows = sqlx::query(
            "SELECT batch_id, ledger_batch_id FROM netting_batches
             WHERE state = ? AND ledger_batch_id >= ?
             ORDER BY ledger_batch_id ASC",
        )
        .bind(state_str(BatchState::Settled))
        .bind(from.0 as i64)
        .fetch_all(&self.db.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let batch_id: String = row.try_get("batch_id")?;
            let ledger_batch_id: i64 = row.try_get("ledger_batch_id")?;
            out.push((parse_batch_id(&batch_id), LedgerBatchId(ledger_batch_id as u64)));
        }
        Ok(out)
    }

    pub async fn consumed_intent_ids(&self, batch_id: &BatchId) -> DbResult<Vec<IntentId>> {
        let rows = sqlx::query(
            "SELECT intent_id FROM batch_intents WHERE batch_id = ? AND consumed = 1",
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| IntentId(r.try_get("intent_id").unwrap_or_default()))
            .collect())
    }

    pub async fn skipped_intent_ids(&self, batch_id: &BatchId) -> DbResult<Vec<IntentId>> {
        let rows = sqlx::query(
            "SELECT intent_id FROM batch_intents WHERE batch_id = ? AND consumed = 0",
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| IntentId(r.try_get("intent_id").unwrap_or_default()))
            .collect())
    }

    pub async fn settled_items(&self, batch_id: &BatchId) -> DbResult<BTreeMap<ItemId, WalletId>> {
        let rows = sqlx::query("SELECT item, final_owner FROM settled_items WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_all(&self.db.pool)
            .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let item: String = row.try_get("item")?;
            let owner: String = row.try_get("final_owner")?;
            out.insert(
                ItemId(item),
                WalletId::from_hex(&owner).unwrap_or(WalletId([0u8; 32])),
            );
        }
        Ok(out)
    }

    /// Like `settled_items`, but with each item's `game` namespace — what
    /// the indexer (C6) needs to write `ownership[(item, game)]`.
    pub async fn settled_items_with_game(
        &self,
        batch_id: &BatchId,
    ) -> DbResult<Vec<(ItemId, tessera_types::GameId, WalletId)>> {
        let rows = sqlx::query("SELECT item, final_owner, game FROM settled_items WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_all(&self.db.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let item: String = row.try_get("item")?;
            let owner: String = row.try_get("final_owner")?;
            let game: String = row.try_get("game")?;
            out.push((
                ItemId(item),
                tessera_types::GameId(game),
                WalletId::from_hex(&owner).unwrap_or(WalletId([0u8; 32])),
            ));
        }
        Ok(out)
    }

    pub async fn net_cash_deltas(&self, batch_id: &BatchId) -> DbResult<BTreeMap<WalletId, Signed128>> {
        let rows = sqlx::query("SELECT wallet, delta FROM net_cash_deltas WHERE batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_all(&self.db.pool)
            .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let wallet: String = row.try_get("wallet")?;
            let delta: String = row.try_get("delta")?;
            out.insert(
                WalletId::from_hex(&wallet).unwrap_or(WalletId([0u8; 32])),
                Signed128(delta.parse().unwrap_or(0)),
            );
        }
        Ok(out)
    }
}

fn state_str(state: BatchState) -> &'static str {
    match state {
        BatchState::Open => "OPEN",
        BatchState::Netted => "NETTED",
        BatchState::Committed => "COMMITTED",
        BatchState::Settled => "SETTLED",
        BatchState::Indexed => "INDEXED",
        BatchState::Aborted => "ABORTED",
    }
}

fn parse_batch_id(s: &str) -> BatchId {
    BatchId(s.parse().unwrap_or_else(|_| ulid::Ulid::new()))
}

fn parse_state(s: &str) -> BatchState {
    match s {
        "NETTED" => BatchState::Netted,
        "COMMITTED" => BatchState::Committed,
        "SETTLED" => BatchState::Settled,
        "INDEXED" => BatchState::Indexed,
        "ABORTED" => BatchState::Aborted,
        _ => BatchState::Open,
    }
}
