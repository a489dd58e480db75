//! # Payment Repository
//!
//! Payments and their allocations against claims.
//!
//! Allocations of a payment are only ever replaced as a whole:
//! `replace_allocations` deletes the previous set and inserts the new one in
//! the caller's transaction.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};
use consign_core::{AllocationLine, AllocationState, OwnerId, Payment, PaymentAllocation};

const PAYMENT_COLUMNS: &str = "id, owner_id, vendor_id, payment_number, payment_date, payment_method, \
     total_amount_cents, allocation_state, reference, notes, created_at, updated_at";

/// Optional filters for [`PaymentRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub vendor_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub struct PaymentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PaymentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PaymentRepository { conn }
    }

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE owner_id = ?1 AND id = ?2", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(owner.as_str())
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(payment)
    }

    pub async fn require(&mut self, owner: &OwnerId, id: &str) -> DbResult<Payment> {
        self.get(owner, id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", id))
    }

    pub async fn insert(&mut self, payment: &Payment) -> DbResult<()> {
        debug!(id = %payment.id, number = %payment.payment_number, "Inserting payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, owner_id, vendor_id, payment_number, payment_date, payment_method,
                total_amount_cents, allocation_state, reference, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.owner_id)
        .bind(&payment.vendor_id)
        .bind(&payment.payment_number)
        .bind(payment.payment_date)
        .bind(payment.payment_method)
        .bind(payment.total_amount_cents)
        .bind(payment.allocation_state)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn set_allocation_state(
        &mut self,
        owner: &OwnerId,
        payment_id: &str,
        state: AllocationState,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE payments SET allocation_state = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4",
        )
        .bind(state)
        .bind(now)
        .bind(payment_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment", payment_id));
        }

        Ok(())
    }

    /// One page of payments, newest payment date first, plus the unpaged count.
    pub async fn list(
        &mut self,
        owner: &OwnerId,
        filter: &PaymentFilter,
        limit: u32,
        offset: u32,
    ) -> DbResult<(Vec<Payment>, i64)> {
        let mut count_qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM payments");
        push_filters(&mut count_qb, owner, filter);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM payments", PAYMENT_COLUMNS));
        push_filters(&mut qb, owner, filter);
        qb.push(" ORDER BY payment_date DESC, created_at DESC, payment_number DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));

        let payments = qb.build_query_as::<Payment>().fetch_all(&mut *self.conn).await?;
        Ok((payments, total))
    }

    pub async fn count_numbers_with_prefix(&mut self, owner: &OwnerId, prefix: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments WHERE owner_id = ?1 AND payment_number LIKE ?2 || '%'",
        )
        .bind(owner.as_str())
        .bind(prefix)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Allocations
    // =========================================================================

    pub async fn allocations(&mut self, owner: &OwnerId, payment_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT pa.id, pa.payment_id, pa.claim_id, pa.claim_item_id, pa.allocated_amount_cents, pa.created_at
            FROM payment_allocations pa
            JOIN payments p ON p.id = pa.payment_id
            WHERE p.owner_id = ?1 AND pa.payment_id = ?2
            ORDER BY pa.rowid ASC
            "#,
        )
        .bind(owner.as_str())
        .bind(payment_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(allocations)
    }

    /// Allocations with the claim number they were applied to.
    pub async fn allocation_lines(&mut self, owner: &OwnerId, payment_id: &str) -> DbResult<Vec<AllocationLine>> {
        let lines = sqlx::query_as::<_, AllocationLine>(
            r#"
            SELECT pa.id, pa.claim_id, c.claim_number, pa.claim_item_id, pa.allocated_amount_cents
            FROM payment_allocations pa
            JOIN payments p ON p.id = pa.payment_id
            JOIN claims c ON c.id = pa.claim_id
            WHERE p.owner_id = ?1 AND pa.payment_id = ?2
            ORDER BY pa.rowid ASC
            "#,
        )
        .bind(owner.as_str())
        .bind(payment_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(lines)
    }

    /// Every allocation recorded against a claim, from any payment.
    pub async fn allocations_for_claim(&mut self, owner: &OwnerId, claim_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT pa.id, pa.payment_id, pa.claim_id, pa.claim_item_id, pa.allocated_amount_cents, pa.created_at
            FROM payment_allocations pa
            JOIN payments p ON p.id = pa.payment_id
            WHERE p.owner_id = ?1 AND pa.claim_id = ?2
            ORDER BY pa.rowid ASC
            "#,
        )
        .bind(owner.as_str())
        .bind(claim_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(allocations)
    }

    /// Replaces every allocation of a payment.
    ///
    /// ## Returns
    /// The allocations that were removed, so the caller can recompute the
    /// claims they touched.
    pub async fn replace_allocations(
        &mut self,
        owner: &OwnerId,
        payment_id: &str,
        allocations: &[PaymentAllocation],
    ) -> DbResult<Vec<PaymentAllocation>> {
        let previous = self.allocations(owner, payment_id).await?;

        sqlx::query(
            r#"
            DELETE FROM payment_allocations
            WHERE payment_id = ?1
              AND payment_id IN (SELECT id FROM payments WHERE owner_id = ?2)
            "#,
        )
        .bind(payment_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        for allocation in allocations {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (
                    id, payment_id, claim_id, claim_item_id, allocated_amount_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.payment_id)
            .bind(&allocation.claim_id)
            .bind(&allocation.claim_item_id)
            .bind(allocation.allocated_amount_cents)
            .bind(allocation.created_at)
            .execute(&mut *self.conn)
            .await?;
        }

        debug!(
            payment_id = %payment_id,
            removed = previous.len(),
            inserted = allocations.len(),
            "Replaced payment allocations"
        );

        Ok(previous)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, owner: &OwnerId, filter: &PaymentFilter) {
    qb.push(" WHERE owner_id = ");
    qb.push_bind(owner.as_str().to_string());

    if let Some(vendor_id) = &filter.vendor_id {
        qb.push(" AND vendor_id = ");
        qb.push_bind(vendor_id.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND payment_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND payment_date <= ");
        qb.push_bind(to);
    }
}
