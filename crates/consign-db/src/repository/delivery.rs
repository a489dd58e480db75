//! # Delivery Repository
//!
//! Deliveries and their reconciled items.
//!
//! ## Data Origin
//! ```text
//! delivery recorded ──► items with quantity_delivered
//!        │
//!        ▼
//! upstream consumption process ──► sold / unsold / expired / damaged
//!        │
//!        ▼
//! claim generation reads them here (never writes them)
//! ```
//!
//! `insert_*` and `record_reconciliation` exist for seeding and tests.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::push_id_list;
use crate::error::{DbError, DbResult};
use consign_core::{Delivery, DeliveryItem, OwnerId, ReconciledQuantities};

const ITEM_COLUMNS: &str = "di.id, di.delivery_id, di.product_id, di.product_name, di.unit_price_cents, \
     di.quantity_delivered_milli, di.quantity_sold_milli, di.quantity_unsold_milli, \
     di.quantity_expired_milli, di.quantity_damaged_milli";

pub struct DeliveryRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> DeliveryRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        DeliveryRepository { conn }
    }

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, owner_id, vendor_id, delivery_number, delivery_date, created_at
            FROM deliveries
            WHERE owner_id = ?1 AND id = ?2
            "#,
        )
        .bind(owner.as_str())
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(delivery)
    }

    /// Fetches the given deliveries; ids the owner does not have are absent.
    pub async fn get_many(&mut self, owner: &OwnerId, ids: &[String]) -> DbResult<Vec<Delivery>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, owner_id, vendor_id, delivery_number, delivery_date, created_at \
             FROM deliveries WHERE owner_id = ",
        );
        qb.push_bind(owner.as_str().to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY delivery_date ASC, delivery_number ASC");

        let deliveries = qb
            .build_query_as::<Delivery>()
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(deliveries)
    }

    /// Items of the given deliveries, in delivery then line order.
    pub async fn items_for(&mut self, owner: &OwnerId, delivery_ids: &[String]) -> DbResult<Vec<DeliveryItem>> {
        if delivery_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM delivery_items di JOIN deliveries d ON d.id = di.delivery_id WHERE d.owner_id = ",
            ITEM_COLUMNS
        ));
        qb.push_bind(owner.as_str().to_string());
        qb.push(" AND di.delivery_id IN ");
        push_id_list(&mut qb, delivery_ids);
        qb.push(" ORDER BY d.delivery_date ASC, d.delivery_number ASC, di.position ASC");

        let items = qb
            .build_query_as::<DeliveryItem>()
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    pub async fn insert_delivery(&mut self, delivery: &Delivery) -> DbResult<()> {
        debug!(id = %delivery.id, number = %delivery.delivery_number, "Inserting delivery");

        sqlx::query(
            r#"
            INSERT INTO deliveries (id, owner_id, vendor_id, delivery_number, delivery_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&delivery.id)
        .bind(&delivery.owner_id)
        .bind(&delivery.vendor_id)
        .bind(&delivery.delivery_number)
        .bind(delivery.delivery_date)
        .bind(delivery.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&mut self, item: &DeliveryItem, position: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_items (
                id, delivery_id, product_id, product_name, unit_price_cents,
                quantity_delivered_milli, quantity_sold_milli, quantity_unsold_milli,
                quantity_expired_milli, quantity_damaged_milli, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&item.id)
        .bind(&item.delivery_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.unit_price_cents)
        .bind(item.quantity_delivered_milli)
        .bind(item.quantity_sold_milli)
        .bind(item.quantity_unsold_milli)
        .bind(item.quantity_expired_milli)
        .bind(item.quantity_damaged_milli)
        .bind(position)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Stores reconciled quantities for a delivery item.
    pub async fn record_reconciliation(
        &mut self,
        owner: &OwnerId,
        item_id: &str,
        quantities: &ReconciledQuantities,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_items SET
                quantity_sold_milli = ?1,
                quantity_unsold_milli = ?2,
                quantity_expired_milli = ?3,
                quantity_damaged_milli = ?4
            WHERE id = ?5
              AND delivery_id IN (SELECT id FROM deliveries WHERE owner_id = ?6)
            "#,
        )
        .bind(quantities.sold.milli())
        .bind(quantities.unsold.milli())
        .bind(quantities.expired.milli())
        .bind(quantities.damaged.milli())
        .bind(item_id)
        .bind(owner.as_str())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Delivery item", item_id));
        }

        Ok(())
    }
}
