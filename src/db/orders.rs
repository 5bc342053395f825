use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{NewOrder, Order, OrderStatus, RecordId};
use crate::outbox::{enqueue, OrderApproved, OutboxEvent};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "order";
const COLUMNS: &str = "id, supplier_id, product_id, design, color, buyer_id, status, created_date";

pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an order. When it is created already `approved`, the print
    /// request is written to the outbox in the same transaction.
    pub async fn create(&self, new: &NewOrder) -> StoreResult<Order> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_date = Utc::now().date_naive();

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO orders (supplier_id, product_id, design, color, buyer_id, status, created_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.supplier_id)
        .bind(new.product_id)
        .bind(&new.design)
        .bind(&new.color)
        .bind(new.buyer_id)
        .bind(new.status)
        .bind(created_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_insert_error(ENTITY, None, None, e))?
        .last_insert_rowid();

        if new.status.prints_on_create() {
            let event = OutboxEvent::OrderApproved(OrderApproved {
                order_id: id,
                product_id: new.product_id,
                design: new.design.clone(),
                color: new.color.clone(),
            });
            enqueue(&mut *tx, &event).await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_id = id,
            supplier_id = new.supplier_id,
            product_id = new.product_id,
            status = %new.status,
            "Created order"
        );

        Ok(Order {
            id,
            supplier_id: new.supplier_id,
            product_id: new.product_id,
            design: new.design.clone(),
            color: new.color.clone(),
            buyer_id: new.buyer_id,
            status: new.status,
            created_date,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Order> {
        sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn list(&self) -> StoreResult<Vec<Order>> {
        Ok(sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders ORDER BY id"))
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list_for_supplier(&self, supplier_id: RecordId) -> StoreResult<Vec<Order>> {
        Ok(sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE supplier_id = ? ORDER BY id"))
            .bind(supplier_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list_for_buyer(&self, buyer_id: RecordId) -> StoreResult<Vec<Order>> {
        Ok(sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE buyer_id = ? ORDER BY id"))
            .bind(buyer_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Any status may follow any other. Moving to `approved` here does not
    /// print; only creation does.
    pub async fn update_status(&self, id: RecordId, status: OrderStatus) -> StoreResult<Order> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(order_id = id, status = %status, "Updated order status");

        self.get(id).await
    }

    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(order_id = id, "Deleted order and its deliveries");
        Ok(())
    }
}
