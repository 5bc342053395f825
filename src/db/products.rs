use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{NewProduct, Product, RecordId};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "product";

pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewProduct) -> StoreResult<Product> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_date = Utc::now().date_naive();

        let id = sqlx::query("INSERT INTO products (name, sort_order, created_date) VALUES (?, ?, ?)")
            .bind(&new.name)
            .bind(new.sort_order)
            .bind(created_date)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_insert_error(ENTITY, Some(&new.name), None, e))?
            .last_insert_rowid();

        tracing::info!(product_id = id, name = %new.name, sort_order = new.sort_order, "Created product");

        Ok(Product {
            id,
            name: new.name.clone(),
            sort_order: new.sort_order,
            created_date,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Product> {
        sqlx::query_as::<_, Product>("SELECT id, name, sort_order, created_date FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
        Ok(
            sqlx::query_as::<_, Product>("SELECT id, name, sort_order, created_date FROM products WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Catalogue order: `sort_order`, then name
    pub async fn list(&self) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT id, name, sort_order, created_date FROM products ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(product_id = id, "Deleted product and its orders");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{fixture, new_order};
    use crate::db::Database;
    use crate::models::{NewProduct, OrderStatus};

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        db.products().create(&NewProduct { name: "Vase".into(), sort_order: 0 }).await.unwrap();

        let err = db
            .products()
            .create(&NewProduct { name: "Vase".into(), sort_order: 3 })
            .await
            .unwrap_err();

        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_list_follows_sort_order() {
        let db = Database::in_memory().await.unwrap();
        for (name, sort_order) in [("Lamp", 2), ("Coaster", 0), ("Bracket", 2)] {
            db.products().create(&NewProduct { name: name.into(), sort_order }).await.unwrap();
        }

        let names: Vec<_> = db.products().list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Coaster", "Bracket", "Lamp"]);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_orders() {
        let f = fixture().await;
        let order = f.db.orders().create(&new_order(&f, OrderStatus::Pending)).await.unwrap();

        f.db.products().delete(f.product.id).await.unwrap();

        assert!(f.db.orders().get(order.id).await.unwrap_err().is_not_found());
        assert!(f.db.products().find_by_name("Keychain").await.unwrap().is_none());
    }
}
