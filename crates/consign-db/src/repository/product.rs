//! # Product Repository
//!
//! Read-only product lookup; sale prices feed consignment item pricing.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::push_id_list;
use crate::error::{DbError, DbResult};
use consign_core::{OwnerId, Product};

pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    pub async fn get(&mut self, owner: &OwnerId, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, owner_id, name, sale_price_cents, created_at
            FROM products
            WHERE owner_id = ?1 AND id = ?2
            "#,
        )
        .bind(owner.as_str())
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(product)
    }

    pub async fn require(&mut self, owner: &OwnerId, id: &str) -> DbResult<Product> {
        self.get(owner, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Fetches several products at once; missing ids are simply absent.
    pub async fn get_many(&mut self, owner: &OwnerId, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, owner_id, name, sale_price_cents, created_at FROM products WHERE owner_id = ",
        );
        qb.push_bind(owner.as_str().to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);

        let products = qb
            .build_query_as::<Product>()
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(products)
    }

    pub async fn insert(&mut self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, owner_id, name, sale_price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.name)
        .bind(product.sale_price_cents)
        .bind(product.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}
