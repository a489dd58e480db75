//! # Consignment Session Repository
//!
//! Sessions, their items and stored aggregates.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_session (open) + insert_item × N                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  update_item_quantities × N  ──► update_totals (from all items)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  set_status(claimed) when the claim is generated                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use consign_core::money::Quantity;
use consign_core::session::SessionTotals;
use consign_core::{ConsignmentItem, ConsignmentSession, OwnerId, SessionStatus};

const SESSION_COLUMNS: &str = "id, owner_id, vendor_id, reference, status, note, \
     total_items_milli, total_value_cents, created_at, updated_at";

const ITEM_COLUMNS: &str = "ci.id, ci.session_id, ci.product_id, ci.product_name, \
     ci.qty_sent_milli, ci.qty_sold_milli, ci.qty_returned_milli, ci.list_price_cents, \
     ci.unit_price_cents, ci.commission_type, ci.commission_rate_bps, \
     ci.commission_amount_cents, ci.total_value_cents, ci.position, ci.created_at, ci.updated_at";

pub struct SessionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SessionRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SessionRepository { conn }
    }

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<ConsignmentSession>> {
        let sql = format!(
            "SELECT {} FROM consignment_sessions WHERE owner_id = ?1 AND id = ?2",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, ConsignmentSession>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(session)
    }

    pub async fn require(&mut self, owner: &OwnerId, id: &str) -> DbResult<ConsignmentSession> {
        self.get(owner, id)
            .await?
            .ok_or_else(|| DbError::not_found("Consignment session", id))
    }

    /// All sessions of the owner, newest first.
    pub async fn list(&mut self, owner: &OwnerId) -> DbResult<Vec<ConsignmentSession>> {
        let sql = format!(
            "SELECT {} FROM consignment_sessions WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
            SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, ConsignmentSession>(&sql)
            .bind(owner.as_str())
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(sessions)
    }

    /// Items of a session in creation order.
    pub async fn items(&mut self, owner: &OwnerId, session_id: &str) -> DbResult<Vec<ConsignmentItem>> {
        let sql = format!(
            "SELECT {} FROM consignment_items ci \
             JOIN consignment_sessions s ON s.id = ci.session_id \
             WHERE s.owner_id = ?1 AND ci.session_id = ?2 \
             ORDER BY ci.position ASC",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, ConsignmentItem>(&sql)
            .bind(owner.as_str())
            .bind(session_id)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(items)
    }

    pub async fn insert_session(&mut self, session: &ConsignmentSession) -> DbResult<()> {
        debug!(id = %session.id, reference = %session.reference, "Inserting consignment session");

        sqlx::query(
            r#"
            INSERT INTO consignment_sessions (
                id, owner_id, vendor_id, reference, status, note,
                total_items_milli, total_value_cents, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(&session.vendor_id)
        .bind(&session.reference)
        .bind(session.status)
        .bind(&session.note)
        .bind(session.total_items_milli)
        .bind(session.total_value_cents)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&mut self, item: &ConsignmentItem) -> DbResult<()> {
        debug!(session_id = %item.session_id, product_id = %item.product_id, "Adding consignment item");

        sqlx::query(
            r#"
            INSERT INTO consignment_items (
                id, session_id, product_id, product_name,
                qty_sent_milli, qty_sold_milli, qty_returned_milli,
                list_price_cents, unit_price_cents, commission_type, commission_rate_bps,
                commission_amount_cents, total_value_cents, position, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&item.id)
        .bind(&item.session_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.qty_sent_milli)
        .bind(item.qty_sold_milli)
        .bind(item.qty_returned_milli)
        .bind(item.list_price_cents)
        .bind(item.unit_price_cents)
        .bind(item.commission_type)
        .bind(item.commission_rate_bps)
        .bind(item.commission_amount_cents)
        .bind(item.total_value_cents)
        .bind(item.position)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Writes reconciled quantities for one item of an owned session.
    pub async fn update_item_quantities(
        &mut self,
        owner: &OwnerId,
        item_id: &str,
        sold: Quantity,
        returned: Quantity,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE consignment_items SET
                qty_sold_milli = ?1,
                qty_returned_milli = ?2,
                updated_at = ?3
            WHERE id = ?4
              AND session_id IN (SELECT id FROM consignment_sessions WHERE owner_id = ?5)
            "#,
        )
        .bind(sold.milli())
        .bind(returned.milli())
        .bind(now)
        .bind(item_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Consignment item", item_id));
        }

        Ok(())
    }

    pub async fn update_totals(
        &mut self,
        owner: &OwnerId,
        session_id: &str,
        totals: &SessionTotals,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE consignment_sessions SET
                total_items_milli = ?1,
                total_value_cents = ?2,
                updated_at = ?3
            WHERE id = ?4 AND owner_id = ?5
            "#,
        )
        .bind(totals.total_items.milli())
        .bind(totals.total_value.cents())
        .bind(now)
        .bind(session_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Consignment session", session_id));
        }

        Ok(())
    }

    pub async fn set_status(
        &mut self,
        owner: &OwnerId,
        session_id: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE consignment_sessions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4",
        )
        .bind(status)
        .bind(now)
        .bind(session_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Consignment session", session_id));
        }

        Ok(())
    }

    /// Counts references already issued with the given daily prefix.
    pub async fn count_references_with_prefix(&mut self, owner: &OwnerId, prefix: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consignment_sessions WHERE owner_id = ?1 AND reference LIKE ?2 || '%'",
        )
        .bind(owner.as_str())
        .bind(prefix)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }
}
