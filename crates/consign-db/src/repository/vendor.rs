//! # Vendor Repository
//!
//! Vendors are maintained elsewhere; settlement only reads them. `insert`
//! exists for seeding and tests.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use consign_core::{OwnerId, Vendor};

pub struct VendorRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> VendorRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        VendorRepository { conn }
    }

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<Vendor>> {
        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            SELECT id, owner_id, name, commission_rate_bps, created_at
            FROM vendors
            WHERE owner_id = ?1 AND id = ?2
            "#,
        )
        .bind(owner.as_str())
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(vendor)
    }

    /// Like [`get`](Self::get) but a missing vendor is an error.
    pub async fn require(&mut self, owner: &OwnerId, id: &str) -> DbResult<Vendor> {
        self.get(owner, id)
            .await?
            .ok_or_else(|| DbError::not_found("Vendor", id))
    }

    pub async fn insert(&mut self, vendor: &Vendor) -> DbResult<()> {
        debug!(id = %vendor.id, name = %vendor.name, "Inserting vendor");

        sqlx::query(
            r#"
            INSERT INTO vendors (id, owner_id, name, commission_rate_bps, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.owner_id)
        .bind(&vendor.name)
        .bind(vendor.commission_rate_bps)
        .bind(vendor.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn count(&mut self, owner: &OwnerId) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendors WHERE owner_id = ?1")
            .bind(owner.as_str())
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;

    #[tokio::test]
    async fn test_vendor_is_owner_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();

        let vendor = Vendor {
            id: "v-1".to_string(),
            owner_id: "owner-a".to_string(),
            name: "Riverside Bakery".to_string(),
            commission_rate_bps: Some(1500),
            created_at: Utc::now(),
        };
        tx.vendors().insert(&vendor).await.unwrap();

        let found = tx.vendors().get(&OwnerId::new("owner-a"), "v-1").await.unwrap();
        assert_eq!(found.unwrap().commission_rate().bps(), 1500);

        let other = tx.vendors().require(&OwnerId::new("owner-b"), "v-1").await;
        assert!(matches!(other, Err(DbError::NotFound { .. })));
    }
}
