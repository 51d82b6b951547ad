use async_trait::async_trait;
use deadpool_postgres::Pool;
use model::{NewProduct, Product, ProductFilter, ProductId};
use tokio_postgres::Row;
use tracing::{info, instrument};

use crate::{CatalogStore, RepositoryError};

const PRODUCT_COLUMNS: &str = "id, name, category, description, price, photo_url, \
                               is_available, is_popular, is_express, created_at";

/// PostgreSQL implementation of [`CatalogStore`] over the `products` table.
pub struct PgCatalogStore {
    db_pool: Pool,
}

impl PgCatalogStore {
    pub fn new(db_pool: Pool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self))]
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let client = self.db_pool.get().await?;
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_available \
               AND ($1::text IS NULL OR category = $1) \
               AND ($2::bool IS NULL OR is_popular = $2) \
             ORDER BY id"
        );
        let rows = client.query(&query, &[&filter.category, &filter.popular]).await?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let client = self.db_pool.get().await?;
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        match client.query_opt(&query, &[&id]).await? {
            Some(row) => product_from_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn seed_products(&self, products: &[NewProduct]) -> Result<usize, RepositoryError> {
        let mut client = self.db_pool.get().await?;
        let tx = client.transaction().await?;

        let existing: i64 = tx.query_one("SELECT COUNT(*) FROM products", &[]).await?.try_get(0)?;
        if existing > 0 {
            info!("Catalog already has {} products, skipping seed", existing);
            return Ok(0);
        }

        let statement = tx
            .prepare(
                "INSERT INTO products (name, category, description, price, photo_url, is_popular, is_express) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .await?;
        for p in products {
            tx.execute(&statement, &[
                &p.name, &p.category, &p.description, &p.price, &p.photo_url, &p.is_popular, &p.is_express,
            ]).await?;
        }
        tx.commit().await?;

        info!("Seeded {} products", products.len());
        Ok(products.len())
    }
}

fn product_from_row(row: &Row) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        photo_url: row.try_get("photo_url")?,
        is_available: row.try_get("is_available")?,
        is_popular: row.try_get("is_popular")?,
        is_express: row.try_get("is_express")?,
        created_at: row.try_get("created_at")?,
    })
}
