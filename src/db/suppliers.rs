use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{NewSupplier, RecordId, Supplier};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "supplier";
const COLUMNS: &str = "id, account_id, name, address, created_date";

pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Name uniqueness and the one-supplier-per-account rule are enforced by
    /// the table's UNIQUE constraints and come back as typed errors.
    pub async fn create(&self, new: &NewSupplier) -> StoreResult<Supplier> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_date = Utc::now().date_naive();

        let id = sqlx::query(
            "INSERT INTO suppliers (account_id, name, address, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(new.account_id)
        .bind(&new.name)
        .bind(&new.address)
        .bind(created_date)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_insert_error(ENTITY, Some(&new.name), Some(new.account_id), e))?
        .last_insert_rowid();

        tracing::info!(supplier_id = id, name = %new.name, "Created supplier");

        Ok(Supplier {
            id,
            account_id: new.account_id,
            name: new.name.clone(),
            address: new.address.clone(),
            created_date,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Supplier> {
        sqlx::query_as::<_, Supplier>(&format!("SELECT {COLUMNS} FROM suppliers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<Supplier>> {
        Ok(sqlx::query_as::<_, Supplier>(&format!("SELECT {COLUMNS} FROM suppliers WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self) -> StoreResult<Vec<Supplier>> {
        Ok(sqlx::query_as::<_, Supplier>(&format!("SELECT {COLUMNS} FROM suppliers ORDER BY name"))
            .fetch_all(&self.pool)
            .await?)
    }

    /// Cascades to the supplier's orders and their deliveries.
    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(supplier_id = id, "Deleted supplier and its orders");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{fixture, new_order};
    use crate::db::StoreError;
    use crate::models::{NewAccount, NewDelivery, NewSupplier, OrderStatus};

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let f = fixture().await;
        let other = f
            .db
            .accounts()
            .create(&NewAccount { username: "copycat".into(), email: String::new() })
            .await
            .unwrap();

        let err = f
            .db
            .suppliers()
            .create(&NewSupplier { account_id: other.id, name: "Acme Prints".into(), address: String::new() })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Duplicate { entity: "supplier", ref name } if name == "Acme Prints"));
    }

    #[tokio::test]
    async fn test_account_can_own_only_one_supplier() {
        let f = fixture().await;

        let err = f
            .db
            .suppliers()
            .create(&NewSupplier {
                account_id: f.supplier.account_id,
                name: "Acme Second Shop".into(),
                address: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::AccountTaken { entity: "supplier", .. }));
    }

    #[tokio::test]
    async fn test_unknown_account_is_missing_reference() {
        let f = fixture().await;

        let err = f
            .db
            .suppliers()
            .create(&NewSupplier { account_id: 999, name: "Ghost".into(), address: String::new() })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::MissingReference { entity: "supplier" }));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_orders_and_deliveries() {
        let f = fixture().await;
        let order = f.db.orders().create(&new_order(&f, OrderStatus::Complete)).await.unwrap();
        let delivery = f
            .db
            .deliveries()
            .create(&NewDelivery { order_id: order.id, courier_name: "DHL".into() })
            .await
            .unwrap();

        f.db.suppliers().delete(f.supplier.id).await.unwrap();

        assert!(f.db.orders().get(order.id).await.unwrap_err().is_not_found());
        assert!(f.db.deliveries().get(delivery.id).await.unwrap_err().is_not_found());
        // the product is not owned by the supplier
        assert!(f.db.products().get(f.product.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_find_by_name_and_list() {
        let f = fixture().await;

        let found = f.db.suppliers().find_by_name("Acme Prints").await.unwrap();
        assert_eq!(found, Some(f.supplier.clone()));
        assert_eq!(f.db.suppliers().find_by_name("Nope").await.unwrap(), None);
        assert_eq!(f.db.suppliers().list().await.unwrap(), vec![f.supplier]);
    }
}
