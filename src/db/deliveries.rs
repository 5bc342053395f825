use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Delivery, NewDelivery, RecordId};
use crate::outbox::{enqueue, DeliveryCreated, OutboxEvent};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "delivery";
const COLUMNS: &str = "id, order_id, courier_name, created_date";

pub struct DeliveryRepository {
    pool: SqlitePool,
}

impl DeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a delivery and its broadcast notice in one transaction.
    /// An order may have any number of deliveries.
    pub async fn create(&self, new: &NewDelivery) -> StoreResult<Delivery> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_date = Utc::now().date_naive();

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query("INSERT INTO deliveries (order_id, courier_name, created_date) VALUES (?, ?, ?)")
            .bind(new.order_id)
            .bind(&new.courier_name)
            .bind(created_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_insert_error(ENTITY, None, None, e))?
            .last_insert_rowid();

        let event = OutboxEvent::DeliveryCreated(DeliveryCreated {
            delivery_id: id,
            order_id: new.order_id,
            courier_name: new.courier_name.clone(),
        });
        enqueue(&mut *tx, &event).await?;

        tx.commit().await?;

        tracing::info!(delivery_id = id, order_id = new.order_id, courier = %new.courier_name, "Created delivery");

        Ok(Delivery {
            id,
            order_id: new.order_id,
            courier_name: new.courier_name.clone(),
            created_date,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Delivery> {
        sqlx::query_as::<_, Delivery>(&format!("SELECT {COLUMNS} FROM deliveries WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn list(&self) -> StoreResult<Vec<Delivery>> {
        Ok(sqlx::query_as::<_, Delivery>(&format!("SELECT {COLUMNS} FROM deliveries ORDER BY id"))
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list_for_order(&self, order_id: RecordId) -> StoreResult<Vec<Delivery>> {
        Ok(sqlx::query_as::<_, Delivery>(&format!("SELECT {COLUMNS} FROM deliveries WHERE order_id = ? ORDER BY id"))
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM deliveries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(delivery_id = id, "Deleted delivery");
        Ok(())
    }
}
