//! Session-key policy and spent-counter persistence.
//!
//! The spent counter is a single SQLite row updated inside a literal
//! `BEGIN IMMEDIATE` transaction (128-bit caps rule out a SQL-text
//! compare-and-set, since SQLite's native arithmetic is 64-bit) — no
//! in-memory shadow counter, which would race against concurrent
//! spenders sharing a session key.

use crate::error::{DbError, DbResult};
use crate::Database;
use serde_json;
use sqlx::Row;
use tessera_types::{Amount, IntentAction, OwnerId, SessionId, SessionKeyPolicy};

pub struct PolicyRepo<'a> {
    db: &'a Database,
}

impl<'a> PolicyRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn register(&self, policy: &SessionKeyPolicy) -> DbResult<()> {
        let actions = serde_json::to_string(&policy.allowed_actions)
            .map_err(|e| DbError::Conflict(e.to_string()))?;
        sqlx::query(
            "INSERT INTO session_policies (owner, session, cap, expiry, allowed_actions, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner, session) DO UPDATE SET
                cap = excluded.cap, expiry = excluded.expiry,
                allowed_actions = excluded.allowed_actions",
        )
        .bind(policy.owner.to_string())
        .bind(policy.session.to_string())
        .bind(policy.cap.to_decimal_string())
        .bind(policy.expiry)
        .bind(actions)
        .bind(policy.created_at)
        .execute(&self.db.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO spent_counters (owner, session, spent) VALUES (?, ?, '0')",
        )
        .bind(policy.owner.to_string())
        .bind(policy.session.to_string())
        .execute(&self.db.pool)
        .await?;

        Ok(())
    }

    pub async fn lookup(&self, owner: &OwnerId, session: &SessionId) -> DbResult<Option<SessionKeyPolicy>> {
        let row = sqlx::query(
            "SELECT owner, session, cap, expiry, allowed_actions, created_at
             FROM session_policies WHERE owner = ? AND session = ?",
        )
        .bind(owner.to_string())
        .bind(session.to_string())
        .fetch_optional(&self.db.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let cap: String = row.try_get("cap")?;
        let actions_json: String = row.try_get("allowed_actions")?;
        let allowed_actions: Vec<IntentAction> =
            serde_json::from_str(&actions_json).unwrap_or_default();

        Ok(Some(SessionKeyPolicy {
            owner: owner.clone(),
            session: session.clone(),
            cap: Amount::from_decimal_string(&cap).unwrap_or(Amount::ZERO),
            expiry: row.try_get("expiry")?,
            allowed_actions,
            created_at: row.try_get("created_at")?,
        }))
    }

    /// Atomically increment `spent` by `amount`, failing if that would
    /// exceed `cap`. Returns `Ok(true)` if the increment was applied.
    ///
    /// SQLite's native integer arithmetic is 64-bit, too narrow for
    /// 128-bit caps, so the compare-and-set happens application-side
    /// rather than in SQL text. `Pool::begin` issues a deferred `BEGIN`,
    /// which only acquires SQLite's write lock at the first write
    /// statement — leaving a window between the read and the write where
    /// a second connection's deferred transaction can interleave the
    /// same read. A literal `BEGIN IMMEDIATE` on a dedicated connection
    /// (the same pattern `IntentRepo::lock_batch` uses) takes the
    /// exclusive write lock up front, so the read-check-write here is
    /// genuinely atomic rather than just transactional.
    pub async fn try_increment_spent(
        &self,
        owner: &OwnerId,
        session: &SessionId,
        amount: Amount,
        cap: Amount,
    ) -> DbResult<bool> {
        let mut conn = self.db.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let row = sqlx::query("SELECT spent FROM spent_counters WHERE owner = ? AND session = ?")
            .bind(owner.to_string())
            .bind(session.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        let current: u128 = match row {
            Some(row) => {
                let spent: String = row.try_get("spent")?;
                spent.parse().unwrap_or(0)
            }
            None => 0,
        };

        let Some(next) = current.checked_add(amount.0) else {
            sqlx::query("ROLLBACK").execute(&mut *conn).await?;
            return Ok(false);
        };
        if next > cap.0 {
            sqlx::query("ROLLBACK").execute(&mut *conn).await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO spent_counters (owner, session, spent) VALUES (?, ?, ?)
             ON CONFLICT(owner, session) DO UPDATE SET spent = excluded.spent",
        )
        .bind(owner.to_string())
        .bind(session.to_string())
        .bind(next.to_string())
        .execute(&mut *conn)
        .await?;

        sqlx::query("COMMIT").execute(&mut *conn).await?;
        Ok(true)
    }

    pub async fn spent(&self, owner: &OwnerId, session: &SessionId) -> DbResult<Amount> {
        let row = sqlx::query("SELECT spent FROM spent_counters WHERE owner = ? AND session = ?")
            .bind(owner.to_string())
            .bind(session.to_string())
            .fetch_optional(&self.db.pool)
            .await?;
        match row {
            Some(row) => {
                let spent: String = row.try_get("spent")?;
                Ok(Amount::from_decimal_string(&spent).unwrap_or(Amount::ZERO))
            }
            None => Ok(Amount::ZERO),
        }
    }
}
