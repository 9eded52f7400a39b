//! Intent queue persistence.
//!
//! `lock_batch` uses `BEGIN IMMEDIATE` (SQLite's exclusive-writer mode)
//! plus a `batch_lock IS NULL` predicate so that two concurrent batchers
//! cannot both claim the same intent — SQLite has no `SELECT ... FOR
//! UPDATE SKIP LOCKED`, so the immediate transaction stands in for that
//! row lock. A second, item-keyed `locked_items` table closes the
//! cross-batch gap a row lock alone leaves open: two distinct intent
//! rows can name the same `item`, so `peek`/`lock_batch` also exclude
//! any item already claimed by another in-flight batch, not just rows
//! already locked by id.

use crate::error::DbResult;
use crate::Database;
use sqlx::Row;
use tessera_types::{Amount, IntentAction, IntentId, ItemId, OwnerId, SessionId, TradeIntent, WalletId};

pub struct IntentRepo<'a> {
    db: &'a Database,
}

impl<'a> IntentRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn id_is_known(&self, id: &IntentId) -> DbResult<bool> {
        let in_queue = sqlx::query("SELECT 1 FROM trade_intents WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.db.pool)
            .await?
            .is_some();
        if in_queue {
            return Ok(true);
        }
        let processed = sqlx::query("SELECT 1 FROM processed_intent_ids WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.db.pool)
            .await?
            .is_some();
        Ok(processed)
    }

    pub async fn nonce_used(&self, session: &SessionId, nonce: u64) -> DbResult<bool> {
        let row = sqlx::query("SELECT 1 FROM used_nonces WHERE session = ? AND nonce = ?")
            .bind(session.to_string())
            .bind(nonce as i64)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Append `intent` to the pending queue and record its nonce, in one
    /// transaction.
    pub async fn enqueue(&self, intent: &TradeIntent) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;

        sqlx::query(
            "INSERT INTO trade_intents
                (id, session, owner, item, from_wallet, to_wallet, amount, nonce, signature,
                 created_at, game, listing, action)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&intent.id.0)
        .bind(intent.session.to_string())
        .bind(intent.owner.to_string())
        .bind(&intent.item.0)
        .bind(intent.from.to_string())
        .bind(intent.to.to_string())
        .bind(intent.amount.to_decimal_string())
        .bind(intent.nonce as i64)
        .bind(&intent.signature)
        .bind(intent.created_at)
        .bind(intent.game.as_ref().map(|g| g.0.clone()))
        .bind(intent.listing.clone())
        .bind(intent.action.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO used_nonces (session, nonce, created_at) VALUES (?, ?, ?)")
            .bind(intent.session.to_string())
            .bind(intent.nonce as i64)
            .bind(intent.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// First `max_count` unlocked, unprocessed intents within `max_age`
    /// of `now`, in FIFO (insertion) order, excluding any intent whose
    /// `item` is already claimed by another in-flight batch in
    /// `locked_items` — the cross-batch double-spend guard.
    pub async fn peek(&self, now: i64, max_age: i64, max_count: i64) -> DbResult<Vec<TradeIntent>> {
        let min_created_at = now - max_age;
        let rows = sqlx::query(
            "SELECT id, session, owner, item, from_wallet, to_wallet, amount, nonce, signature,
                    created_at, game, listing, action
             FROM trade_intents
             WHERE batch_lock IS NULL AND terminal_state IS NULL AND created_at >= ?
               AND item NOT IN (SELECT item FROM locked_items)
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?",
        )
        .bind(min_created_at)
        .bind(max_count)
        .fetch_all(&self.db.pool)
        .await?;

        rows.into_iter().map(row_to_intent).collect()
    }

    /// Claim `intent_ids` for `batch_id`, excluding any already locked
    /// or whose `item` is already claimed by another in-flight batch.
    /// Returns the subset actually claimed.
    ///
    /// Acquires a dedicated connection and opens the transaction with a
    /// literal `BEGIN IMMEDIATE` rather than `Pool::begin` (which issues a
    /// deferred `BEGIN` that a second, nested `BEGIN IMMEDIATE` cannot
    /// escalate) so the exclusive write lock is held for the whole claim,
    /// matching `SELECT ... FOR UPDATE SKIP LOCKED` on a row-locking store.
    /// Each claimed row's `item` is inserted into `locked_items` in the
    /// same transaction, so a second batcher's `peek`/`lock_batch` can
    /// never pick up the same item while this batch is still in flight.
    pub async fn lock_batch(&self, batch_id: &str, intent_ids: &[IntentId]) -> DbResult<Vec<IntentId>> {
        let mut conn = self.db.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let mut claimed = Vec::with_capacity(intent_ids.len());
        for id in intent_ids {
            let result = sqlx::query(
                "UPDATE trade_intents SET batch_lock = ? WHERE id = ? AND batch_lock IS NULL
                   AND item NOT IN (SELECT item FROM locked_items)",
            )
            .bind(batch_id)
            .bind(&id.0)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 1 {
                let item: String = sqlx::query("SELECT item FROM trade_intents WHERE id = ?")
                    .bind(&id.0)
                    .fetch_one(&mut *conn)
                    .await?
                    .try_get("item")?;
                sqlx::query(
                    "INSERT INTO locked_items (item, batch_id) VALUES (?, ?)
                     ON CONFLICT(item) DO UPDATE SET batch_id = excluded.batch_id",
                )
                .bind(&item)
                .bind(batch_id)
                .execute(&mut *conn)
                .await?;
                claimed.push(id.clone());
            }
        }

        sqlx::query("COMMIT").execute(&mut *conn).await?;
        Ok(claimed)
    }

    /// Move consumed/skipped intent ids to the processed set and drop
    /// their queue rows (terminal: `COMMITTED` -> `SETTLED`), releasing
    /// `batch_id`'s claim on `locked_items` now that it has left the
    /// unsettled set.
    pub async fn finalise_settled(&self, batch_id: &str, intent_ids: &[IntentId], now: i64) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;
        for id in intent_ids {
            sqlx::query("INSERT OR IGNORE INTO processed_intent_ids (id, processed_at) VALUES (?, ?)")
                .bind(&id.0)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM trade_intents WHERE id = ?")
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM locked_items WHERE batch_id = ?")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `ABORTED` outcome: unlock the intents, and either return them to
    /// the pending queue or mark them terminally skipped, per
    /// `requeue_skipped`. Also releases `batch_id`'s claim on
    /// `locked_items`, since an aborted batch is no longer in flight.
    pub async fn abort_batch(&self, batch_id: &str, intent_ids: &[IntentId], requeue: bool) -> DbResult<()> {
        let mut tx = self.db.pool.begin().await?;
        for id in intent_ids {
            if requeue {
                sqlx::query("UPDATE trade_intents SET batch_lock = NULL WHERE id = ?")
                    .bind(&id.0)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(
                    "UPDATE trade_intents SET batch_lock = NULL, terminal_state = 'skipped' WHERE id = ?",
                )
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
            }
        }
        sqlx::query("DELETE FROM locked_items WHERE batch_id = ?")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> DbResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM trade_intents WHERE batch_lock IS NULL AND terminal_state IS NULL",
        )
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row.try_get("c")?)
    }

    /// `now - created_at` of the oldest unlocked, unprocessed intent, or
    /// `None` if the queue is empty — the window policy's age check.
    pub async fn oldest_pending_age(&self, now: i64) -> DbResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT MIN(created_at) as oldest FROM trade_intents WHERE batch_lock IS NULL AND terminal_state IS NULL",
        )
        .fetch_one(&self.db.pool)
        .await?;
        let oldest: Option<i64> = row.try_get("oldest")?;
        Ok(oldest.map(|created_at| now - created_at))
    }

    /// Evict `used_nonces` rows older than `nonce_ttl_seconds`. The
    /// replay check only ever queries by `(session, nonce)`, never by
    /// age, so this is a pure retention trim, not a correctness path —
    /// safe to run on any schedule at or past the TTL floor.
    pub async fn prune_nonces(&self, cutoff: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM used_nonces WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Evict `processed_intent_ids` rows older than
    /// `processed_id_ttl_seconds`. Safe once a processed id is this
    /// old: the replay window spec.md guarantees (≥7d) has long since
    /// passed, and `trade_intents` itself no longer carries the row
    /// (`finalise_settled` already deleted it).
    pub async fn prune_processed_ids(&self, cutoff: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM processed_intent_ids WHERE processed_at < ?")
            .bind(cutoff)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_intent(row: sqlx::sqlite::SqliteRow) -> DbResult<TradeIntent> {
    let amount: String = row.try_get("amount")?;
    let action: String = row.try_get("action")?;
    let game: Option<String> = row.try_get("game")?;

    Ok(TradeIntent {
        id: IntentId(row.try_get("id")?),
        session: SessionId::from_hex(&row.try_get::<String, _>("session")?).unwrap_or(SessionId([0u8; 32])),
        owner: OwnerId::from_hex(&row.try_get::<String, _>("owner")?).unwrap_or(OwnerId([0u8; 32])),
        item: ItemId(row.try_get("item")?),
        from: WalletId::from_hex(&row.try_get::<String, _>("from_wallet")?).unwrap_or(WalletId([0u8; 32])),
        to: WalletId::from_hex(&row.try_get::<String, _>("to_wallet")?).unwrap_or(WalletId([0u8; 32])),
        amount: Amount::from_decimal_string(&amount).unwrap_or(Amount::ZERO),
        nonce: row.try_get::<i64, _>("nonce")? as u64,
        signature: row.try_get("signature")?,
        created_at: row.try_get("created_at")?,
        game: game.map(|g| tessera_types::GameId(g)),
        listing: row.try_get("listing")?,
        action: match action.as_str() {
            "BID" => IntentAction::Bid,
            "BUY_NOW" => IntentAction::BuyNow,
            _ => IntentAction::Trade,
        },
    })
}
