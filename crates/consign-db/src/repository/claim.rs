//! # Claim Repository
//!
//! Claims, claim items and the listings built on them.
//!
//! ## Aggregates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  claim_items (authoritative)                                            │
//! │     gross / commission / net / paid / balance per line                  │
//! │       │                                                                 │
//! │       ▼  ClaimTotals::from_items                                        │
//! │  claims.gross / commission / net / paid / balance                       │
//! │                                                                         │
//! │  Item rows are written first, then update_totals stores the sums.       │
//! │  Totals are never adjusted incrementally.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::push_id_list;
use crate::error::{DbError, DbResult};
use consign_core::claim::{ClaimTotals, LineAmounts};
use consign_core::money::Money;
use consign_core::{Claim, ClaimItem, ClaimStatus, OutstandingClaim, OwnerId, ReconciledQuantities};

const CLAIM_COLUMNS: &str = "id, owner_id, vendor_id, claim_number, claim_date, status, source, session_id, \
     gross_amount_cents, commission_rate_bps, commission_amount_cents, net_amount_cents, \
     paid_amount_cents, balance_amount_cents, notes, submitted_at, approved_at, settled_at, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "ci.id, ci.claim_id, ci.delivery_item_id, ci.consignment_item_id, \
     ci.product_id, ci.product_name, ci.quantity_delivered_milli, ci.quantity_sold_milli, \
     ci.quantity_unsold_milli, ci.quantity_expired_milli, ci.quantity_damaged_milli, \
     ci.unit_price_cents, ci.gross_amount_cents, ci.commission_amount_cents, ci.net_amount_cents, \
     ci.paid_amount_cents, ci.balance_amount_cents, ci.carry_forward, ci.position, \
     ci.created_at, ci.updated_at";

/// Optional filters for [`ClaimRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub vendor_id: Option<String>,
    pub status: Option<ClaimStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub struct ClaimRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ClaimRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ClaimRepository { conn }
    }

    // =========================================================================
    // Claims
    // =========================================================================

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<Claim>> {
        let sql = format!("SELECT {} FROM claims WHERE owner_id = ?1 AND id = ?2", CLAIM_COLUMNS);
        let claim = sqlx::query_as::<_, Claim>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(claim)
    }

    pub async fn require(&mut self, owner: &OwnerId, id: &str) -> DbResult<Claim> {
        self.get(owner, id)
            .await?
            .ok_or_else(|| DbError::not_found("Claim", id))
    }

    /// The claim generated from a session, if any.
    pub async fn find_by_session(&mut self, owner: &OwnerId, session_id: &str) -> DbResult<Option<Claim>> {
        let sql = format!(
            "SELECT {} FROM claims WHERE owner_id = ?1 AND session_id = ?2",
            CLAIM_COLUMNS
        );
        let claim = sqlx::query_as::<_, Claim>(&sql)
            .bind(owner.as_str())
            .bind(session_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(claim)
    }

    /// Fetches several claims; ids the owner does not have are absent.
    pub async fn get_many(&mut self, owner: &OwnerId, ids: &[String]) -> DbResult<Vec<Claim>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM claims WHERE owner_id = ", CLAIM_COLUMNS));
        qb.push_bind(owner.as_str().to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);

        let claims = qb.build_query_as::<Claim>().fetch_all(&mut *self.conn).await?;
        Ok(claims)
    }

    pub async fn insert_claim(&mut self, claim: &Claim) -> DbResult<()> {
        debug!(id = %claim.id, number = %claim.claim_number, "Inserting claim");

        sqlx::query(
            r#"
            INSERT INTO claims (
                id, owner_id, vendor_id, claim_number, claim_date, status, source, session_id,
                gross_amount_cents, commission_rate_bps, commission_amount_cents, net_amount_cents,
                paid_amount_cents, balance_amount_cents, notes, submitted_at, approved_at, settled_at,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18,
                ?19, ?20
            )
            "#,
        )
        .bind(&claim.id)
        .bind(&claim.owner_id)
        .bind(&claim.vendor_id)
        .bind(&claim.claim_number)
        .bind(claim.claim_date)
        .bind(claim.status)
        .bind(claim.source)
        .bind(&claim.session_id)
        .bind(claim.gross_amount_cents)
        .bind(claim.commission_rate_bps)
        .bind(claim.commission_amount_cents)
        .bind(claim.net_amount_cents)
        .bind(claim.paid_amount_cents)
        .bind(claim.balance_amount_cents)
        .bind(&claim.notes)
        .bind(claim.submitted_at)
        .bind(claim.approved_at)
        .bind(claim.settled_at)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Records that a delivery was claimed by a claim.
    pub async fn link_delivery(&mut self, claim_id: &str, delivery_id: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO claim_deliveries (claim_id, delivery_id) VALUES (?1, ?2)")
            .bind(claim_id)
            .bind(delivery_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Stores aggregate amounts recomputed from the claim's items.
    pub async fn update_totals(
        &mut self,
        owner: &OwnerId,
        claim_id: &str,
        totals: &ClaimTotals,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE claims SET
                gross_amount_cents = ?1,
                commission_amount_cents = ?2,
                net_amount_cents = ?3,
                paid_amount_cents = ?4,
                balance_amount_cents = ?5,
                updated_at = ?6
            WHERE id = ?7 AND owner_id = ?8
            "#,
        )
        .bind(totals.gross.cents())
        .bind(totals.commission.cents())
        .bind(totals.net.cents())
        .bind(totals.paid.cents())
        .bind(totals.balance.cents())
        .bind(now)
        .bind(claim_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim", claim_id));
        }

        Ok(())
    }

    /// Moves a claim to `status`, stamping the matching timestamp.
    ///
    /// `approved_at` is stamped once; returning to approved clears `settled_at`.
    pub async fn set_status(
        &mut self,
        owner: &OwnerId,
        claim_id: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(claim_id = %claim_id, status = %status, "Updating claim status");

        let result = sqlx::query(
            r#"
            UPDATE claims SET
                status = ?1,
                submitted_at = CASE WHEN ?1 = 'submitted' THEN ?2 ELSE submitted_at END,
                approved_at = CASE
                    WHEN ?1 IN ('approved', 'settled') AND approved_at IS NULL THEN ?2
                    ELSE approved_at
                END,
                settled_at = CASE
                    WHEN ?1 = 'settled' THEN ?2
                    WHEN ?1 = 'approved' THEN NULL
                    ELSE settled_at
                END,
                updated_at = ?2
            WHERE id = ?3 AND owner_id = ?4
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(claim_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim", claim_id));
        }

        Ok(())
    }

    pub async fn set_notes(
        &mut self,
        owner: &OwnerId,
        claim_id: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE claims SET notes = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4")
            .bind(notes)
            .bind(now)
            .bind(claim_id)
            .bind(owner.as_str())
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim", claim_id));
        }

        Ok(())
    }

    /// One page of claims, newest claim date first, plus the unpaged count.
    pub async fn list(
        &mut self,
        owner: &OwnerId,
        filter: &ClaimFilter,
        limit: u32,
        offset: u32,
    ) -> DbResult<(Vec<Claim>, i64)> {
        let mut count_qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM claims");
        push_filters(&mut count_qb, owner, filter);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!("SELECT {} FROM claims", CLAIM_COLUMNS));
        push_filters(&mut qb, owner, filter);
        qb.push(" ORDER BY claim_date DESC, created_at DESC, claim_number DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));

        let claims = qb.build_query_as::<Claim>().fetch_all(&mut *self.conn).await?;
        Ok((claims, total))
    }

    /// Submitted or approved claims of a vendor that still owe money, newest first.
    pub async fn outstanding(&mut self, owner: &OwnerId, vendor_id: &str) -> DbResult<Vec<OutstandingClaim>> {
        let claims = sqlx::query_as::<_, OutstandingClaim>(
            r#"
            SELECT id AS claim_id, claim_number, claim_date, status, balance_amount_cents
            FROM claims
            WHERE owner_id = ?1
              AND vendor_id = ?2
              AND status IN ('approved', 'submitted')
              AND balance_amount_cents > 0
            ORDER BY claim_date DESC, created_at DESC
            "#,
        )
        .bind(owner.as_str())
        .bind(vendor_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(claims)
    }

    /// Counts claim numbers already issued with the given daily prefix.
    pub async fn count_numbers_with_prefix(&mut self, owner: &OwnerId, prefix: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims WHERE owner_id = ?1 AND claim_number LIKE ?2 || '%'",
        )
        .bind(owner.as_str())
        .bind(prefix)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Claim Items
    // =========================================================================

    pub async fn insert_item(&mut self, item: &ClaimItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO claim_items (
                id, claim_id, delivery_item_id, consignment_item_id, product_id, product_name,
                quantity_delivered_milli, quantity_sold_milli, quantity_unsold_milli,
                quantity_expired_milli, quantity_damaged_milli, unit_price_cents,
                gross_amount_cents, commission_amount_cents, net_amount_cents,
                paid_amount_cents, balance_amount_cents, carry_forward, position,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14, ?15,
                ?16, ?17, ?18, ?19,
                ?20, ?21
            )
            "#,
        )
        .bind(&item.id)
        .bind(&item.claim_id)
        .bind(&item.delivery_item_id)
        .bind(&item.consignment_item_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity_delivered_milli)
        .bind(item.quantity_sold_milli)
        .bind(item.quantity_unsold_milli)
        .bind(item.quantity_expired_milli)
        .bind(item.quantity_damaged_milli)
        .bind(item.unit_price_cents)
        .bind(item.gross_amount_cents)
        .bind(item.commission_amount_cents)
        .bind(item.net_amount_cents)
        .bind(item.paid_amount_cents)
        .bind(item.balance_amount_cents)
        .bind(item.carry_forward)
        .bind(item.position)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Items of a claim in creation order.
    pub async fn items(&mut self, owner: &OwnerId, claim_id: &str) -> DbResult<Vec<ClaimItem>> {
        let sql = format!(
            "SELECT {} FROM claim_items ci JOIN claims c ON c.id = ci.claim_id \
             WHERE c.owner_id = ?1 AND ci.claim_id = ?2 \
             ORDER BY ci.position ASC",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, ClaimItem>(&sql)
            .bind(owner.as_str())
            .bind(claim_id)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(items)
    }

    /// An item, only if it belongs to the given claim.
    pub async fn get_item(&mut self, owner: &OwnerId, claim_id: &str, item_id: &str) -> DbResult<Option<ClaimItem>> {
        let sql = format!(
            "SELECT {} FROM claim_items ci JOIN claims c ON c.id = ci.claim_id \
             WHERE c.owner_id = ?1 AND ci.claim_id = ?2 AND ci.id = ?3",
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, ClaimItem>(&sql)
            .bind(owner.as_str())
            .bind(claim_id)
            .bind(item_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(item)
    }

    /// Writes corrected quantities and the amounts derived from them.
    pub async fn update_item_amounts(
        &mut self,
        owner: &OwnerId,
        item_id: &str,
        quantities: &ReconciledQuantities,
        amounts: &LineAmounts,
        balance: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE claim_items SET
                quantity_sold_milli = ?1,
                quantity_unsold_milli = ?2,
                quantity_expired_milli = ?3,
                quantity_damaged_milli = ?4,
                gross_amount_cents = ?5,
                commission_amount_cents = ?6,
                net_amount_cents = ?7,
                balance_amount_cents = ?8,
                updated_at = ?9
            WHERE id = ?10
              AND claim_id IN (SELECT id FROM claims WHERE owner_id = ?11)
            "#,
        )
        .bind(quantities.sold.milli())
        .bind(quantities.unsold.milli())
        .bind(quantities.expired.milli())
        .bind(quantities.damaged.milli())
        .bind(amounts.gross.cents())
        .bind(amounts.commission.cents())
        .bind(amounts.net.cents())
        .bind(balance.cents())
        .bind(now)
        .bind(item_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim item", item_id));
        }

        Ok(())
    }

    /// Stores an item's paid amount and the balance that follows from it.
    pub async fn update_item_payment(
        &mut self,
        owner: &OwnerId,
        item_id: &str,
        paid: Money,
        balance: Money,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE claim_items SET
                paid_amount_cents = ?1,
                balance_amount_cents = ?2,
                updated_at = ?3
            WHERE id = ?4
              AND claim_id IN (SELECT id FROM claims WHERE owner_id = ?5)
            "#,
        )
        .bind(paid.cents())
        .bind(balance.cents())
        .bind(now)
        .bind(item_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Claim item", item_id));
        }

        Ok(())
    }

    /// Flags items of the vendor's claims as carried forward.
    ///
    /// ## Returns
    /// Number of items flagged; ids outside the vendor's open (submitted or
    /// approved) claims are skipped.
    pub async fn set_carry_forward(
        &mut self,
        owner: &OwnerId,
        vendor_id: &str,
        item_ids: &[String],
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE claim_items SET carry_forward = 1, updated_at = ");
        qb.push_bind(now);
        qb.push(" WHERE id IN ");
        push_id_list(&mut qb, item_ids);
        qb.push(" AND claim_id IN (SELECT id FROM claims WHERE owner_id = ");
        qb.push_bind(owner.as_str().to_string());
        qb.push(" AND vendor_id = ");
        qb.push_bind(vendor_id.to_string());
        qb.push(" AND status IN ('submitted', 'approved'))");

        let result = qb.build().execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    /// Delivery numbers keyed by claim item id (delivery claims only).
    pub async fn delivery_numbers(&mut self, owner: &OwnerId, claim_id: &str) -> DbResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT ci.id, d.delivery_number
            FROM claim_items ci
            JOIN claims c ON c.id = ci.claim_id
            JOIN delivery_items di ON di.id = ci.delivery_item_id
            JOIN deliveries d ON d.id = di.delivery_id
            WHERE c.owner_id = ?1 AND ci.claim_id = ?2
            "#,
        )
        .bind(owner.as_str())
        .bind(claim_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, owner: &OwnerId, filter: &ClaimFilter) {
    qb.push(" WHERE owner_id = ");
    qb.push_bind(owner.as_str().to_string());

    if let Some(vendor_id) = &filter.vendor_id {
        qb.push(" AND vendor_id = ");
        qb.push_bind(vendor_id.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(from) = filter.from {
        qb.push(" AND claim_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND claim_date <= ");
        qb.push_bind(to);
    }
}
