//! # Event Outbox Repository
//!
//! Settlement events are written next to the state change they describe and
//! handed to the publisher after commit.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OPERATION (e.g. generate claim)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────── SINGLE TRANSACTION ───────────────────┐   │
//! │  │  1. INSERT INTO claims / claim_items ...                         │   │
//! │  │  2. INSERT INTO event_outbox (topic, aggregate_id, payload)      │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the event exists if and only if the change does               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  publish ──ok──► mark_published                                         │
//! │     │                                                                   │
//! │     └──err──► mark_failed (attempts += 1); replayed by flush            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The outbox is an infrastructure table; pending entries are read across
//! owners so one flusher can drain everything.

use chrono::{Duration, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use consign_core::{OutboxEntry, OwnerId};

const COLUMNS: &str = "id, owner_id, topic, aggregate_id, payload, attempts, last_error, \
     created_at, attempted_at, published_at";

pub struct OutboxRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OutboxRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        OutboxRepository { conn }
    }

    /// Queues an event.
    ///
    /// `event_id` becomes the entry id so consumers can de-duplicate replays.
    pub async fn enqueue(
        &mut self,
        owner: &OwnerId,
        event_id: &str,
        topic: &str,
        aggregate_id: &str,
        payload: &str,
    ) -> DbResult<OutboxEntry> {
        debug!(topic = %topic, aggregate_id = %aggregate_id, "Queuing event");

        let entry = OutboxEntry {
            id: event_id.to_string(),
            owner_id: owner.as_str().to_string(),
            topic: topic.to_string(),
            aggregate_id: aggregate_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            published_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO event_outbox (
                id, owner_id, topic, aggregate_id, payload,
                attempts, last_error, created_at, attempted_at, published_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.owner_id)
        .bind(&entry.topic)
        .bind(&entry.aggregate_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.published_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<OutboxEntry>> {
        let sql = format!("SELECT {} FROM event_outbox WHERE id = ?1", COLUMNS);
        let entry = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(entry)
    }

    /// Unpublished entries, oldest first.
    pub async fn get_pending(&mut self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "SELECT {} FROM event_outbox WHERE published_at IS NULL \
             ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            COLUMNS
        );
        let entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(entries)
    }

    pub async fn mark_published(&mut self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE event_outbox SET
                published_at = ?2,
                attempted_at = ?2,
                attempts = attempts + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Outbox entry", id));
        }

        Ok(())
    }

    /// Records a failed publish attempt.
    pub async fn mark_failed(&mut self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE event_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&mut self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE published_at IS NULL")
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(count)
    }

    /// Deletes entries published more than `days_old` days ago.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_old_entries(&mut self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            "DELETE FROM event_outbox WHERE published_at IS NOT NULL AND published_at < ?1",
        )
        .bind(cutoff)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_pending_until_published() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let owner = OwnerId::new("owner-a");
        let mut tx = db.begin().await.unwrap();

        tx.outbox()
            .enqueue(&owner, "evt-1", "consignment-claim-generated", "c-1", "{}")
            .await
            .unwrap();
        tx.outbox()
            .enqueue(&owner, "evt-2", "consignment-claim-approved", "c-1", "{}")
            .await
            .unwrap();
        assert_eq!(tx.outbox().count_pending().await.unwrap(), 2);

        tx.outbox().mark_failed("evt-1", "channel closed").await.unwrap();
        tx.outbox().mark_published("evt-2").await.unwrap();

        let pending = tx.outbox().get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "evt-1");
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("channel closed"));

        // Freshly published entries survive cleanup.
        assert_eq!(tx.outbox().cleanup_old_entries(7).await.unwrap(), 0);
    }
}
