//! # Session History Repository
//!
//! Append-only log of what happened to a consignment session.

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::DbResult;
use consign_core::{HistoryEventType, OwnerId, SessionHistoryEntry};

pub struct HistoryRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> HistoryRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        HistoryRepository { conn }
    }

    /// Appends an entry with JSON details.
    pub async fn record(
        &mut self,
        owner: &OwnerId,
        session_id: &str,
        event_type: HistoryEventType,
        details: &serde_json::Value,
    ) -> DbResult<SessionHistoryEntry> {
        let entry = SessionHistoryEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            owner_id: owner.as_str().to_string(),
            event_type,
            details: serde_json::to_string(details)?,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO consignment_history (id, session_id, owner_id, event_type, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.session_id)
        .bind(&entry.owner_id)
        .bind(entry.event_type)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    /// Entries of a session, newest first.
    pub async fn list(&mut self, owner: &OwnerId, session_id: &str) -> DbResult<Vec<SessionHistoryEntry>> {
        let entries = sqlx::query_as::<_, SessionHistoryEntry>(
            r#"
            SELECT id, session_id, owner_id, event_type, details, created_at
            FROM consignment_history
            WHERE owner_id = ?1 AND session_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(owner.as_str())
        .bind(session_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(entries)
    }
}
