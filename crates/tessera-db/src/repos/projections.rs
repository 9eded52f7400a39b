//! Shadow-table projections the indexer maintains from committed
//! batches: current ownership, running balances, item history, and
//! the indexer's replay cursor.
//!
//! Every write here is idempotent per `(key, ledger_batch_id)` so a
//! resync that replays an already-applied batch is a no-op rather than
//! a double-application.

use crate::error::DbResult;
use crate::Database;
use sqlx::Row;
use tessera_types::{ItemId, LedgerBatchId, Signed128, WalletId};

pub struct ProjectionRepo<'a> {
    db: &'a Database,
}

impl<'a> ProjectionRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn cursor(&self) -> DbResult<LedgerBatchId> {
        let row = sqlx::query("SELECT last_indexed_ledger_batch_id FROM indexer_cursor WHERE id = 0")
            .fetch_one(&self.db.pool)
            .await?;
        Ok(LedgerBatchId(row.try_get::<i64, _>("last_indexed_ledger_batch_id")? as u64))
    }

    /// Apply one item's ownership transfer and history entry, if this
    /// ledger batch hasn't already been applied to that item.
    pub async fn apply_ownership(
        &self,
        item: &ItemId,
        game: &str,
        from_owner: Option<&WalletId>,
        to_owner: &WalletId,
        ledger_batch_id: LedgerBatchId,
        now: i64,
    ) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;

        let already_applied = sqlx::query(
            "SELECT 1 FROM ownership WHERE item = ? AND game = ? AND ledger_batch_id >= ?",
        )
        .bind(&item.0)
        .bind(game)
        .bind(ledger_batch_id.0 as i64)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if already_applied {
            tx.rollback().await?;
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO ownership (item, game, owner, ledger_batch_id, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(item, game) DO UPDATE SET
                owner = excluded.owner, ledger_batch_id = excluded.ledger_batch_id,
                updated_at = excluded.updated_at",
        )
        .bind(&item.0)
        .bind(game)
        .bind(to_owner.to_string())
        .bind(ledger_batch_id.0 as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO item_history (item, game, from_owner, to_owner, ledger_batch_id, applied_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.0)
        .bind(game)
        .bind(from_owner.map(|o| o.to_string()))
        .bind(to_owner.to_string())
        .bind(ledger_batch_id.0 as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Apply one wallet's net cash delta for a ledger batch, idempotent
    /// on `last_ledger_batch_id`.
    pub async fn apply_balance_delta(
        &self,
        wallet: &WalletId,
        game: &str,
        delta: Signed128,
        ledger_batch_id: LedgerBatchId,
    ) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;

        let row = sqlx::query(
            "SELECT delta_sum, last_ledger_batch_id FROM balances WHERE wallet = ? AND game = ?",
        )
        .bind(wallet.to_string())
        .bind(game)
        .fetch_optional(&mut *tx)
        .await?;

        let (current, last_applied): (i128, Option<i64>) = match row {
            Some(row) => {
                let sum: String = row.try_get("delta_sum")?;
                (sum.parse().unwrap_or(0), row.try_get("last_ledger_batch_id")?)
            }
            None => (0, None),
        };

        if let Some(last) = last_applied {
            if last >= ledger_batch_id.0 as i64 {
                tx.rollback().await?;
                return Ok(());
            }
        }

        let next = current + delta.0;

        sqlx::query(
            "INSERT INTO balances (wallet, game, delta_sum, last_ledger_batch_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(wallet, game) DO UPDATE SET
                delta_sum = excluded.delta_sum, last_ledger_batch_id = excluded.last_ledger_batch_id",
        )
        .bind(wallet.to_string())
        .bind(game)
        .bind(next.to_string())
        .bind(ledger_batch_id.0 as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn advance_cursor(&self, ledger_batch_id: LedgerBatchId) -> DbResult<()> {
        sqlx::query(
            "UPDATE indexer_cursor SET last_indexed_ledger_batch_id = ?
             WHERE id = 0 AND last_indexed_ledger_batch_id < ?",
        )
        .bind(ledger_batch_id.0 as i64)
        .bind(ledger_batch_id.0 as i64)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    /// Every item currently owned by `owner`, with the ledger batch
    /// that last updated each — backs the `/inventory` read.
    pub async fn items_owned_by(&self, owner: &WalletId) -> DbResult<Vec<(ItemId, String, LedgerBatchId)>> {
        let rows = sqlx::query(
            "SELECT item, game, ledger_batch_id FROM ownership WHERE owner = ? ORDER BY item ASC",
        )
        .bind(owner.to_string())
        .fetch_all(&self.db.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let item: String = row.try_get("item")?;
            let game: String = row.try_get("game")?;
            let ledger_batch_id: i64 = row.try_get("ledger_batch_id")?;
            out.push((ItemId(item), game, LedgerBatchId(ledger_batch_id as u64)));
        }
        Ok(out)
    }

    pub async fn owner_of(&self, item: &ItemId, game: &str) -> DbResult<Option<WalletId>> {
        let row = sqlx::query("SELECT owner FROM ownership WHERE item = ? AND game = ?")
            .bind(&item.0)
            .bind(game)
            .fetch_optional(&self.db.pool)
            .await?;
        match row {
            Some(row) => {
                let owner: String = row.try_get("owner")?;
                Ok(Some(WalletId::from_hex(&owner).unwrap_or(WalletId([0u8; 32]))))
            }
            None => Ok(None),
        }
    }

    pub async fn balance_of(&self, wallet: &WalletId, game: &str) -> DbResult<Signed128> {
        let row = sqlx::query("SELECT delta_sum FROM balances WHERE wallet = ? AND game = ?")
            .bind(wallet.to_string())
            .bind(game)
            .fetch_optional(&self.db.pool)
            .await?;
        match row {
            Some(row) => {
                let sum: String = row.try_get("delta_sum")?;
                Ok(Signed128(sum.parse().unwrap_or(0)))
            }
            None => Ok(Signed128::ZERO),
        }
    }
}
