use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Buyer, NewBuyer, RecordId};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "buyer";
const COLUMNS: &str = "id, account_id, name, address, created_date";

pub struct BuyerRepository {
    pool: SqlitePool,
}

impl BuyerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewBuyer) -> StoreResult<Buyer> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_date = Utc::now().date_naive();

        let id = sqlx::query(
            "INSERT INTO buyers (account_id, name, address, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(new.account_id)
        .bind(&new.name)
        .bind(&new.address)
        .bind(created_date)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_insert_error(ENTITY, Some(&new.name), Some(new.account_id), e))?
        .last_insert_rowid();

        tracing::info!(buyer_id = id, name = %new.name, "Created buyer");

        Ok(Buyer {
            id,
            account_id: new.account_id,
            name: new.name.clone(),
            address: new.address.clone(),
            created_date,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Buyer> {
        sqlx::query_as::<_, Buyer>(&format!("SELECT {COLUMNS} FROM buyers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<Buyer>> {
        Ok(sqlx::query_as::<_, Buyer>(&format!("SELECT {COLUMNS} FROM buyers WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self) -> StoreResult<Vec<Buyer>> {
        Ok(sqlx::query_as::<_, Buyer>(&format!("SELECT {COLUMNS} FROM buyers ORDER BY name"))
            .fetch_all(&self.pool)
            .await?)
    }

    /// Orders placed by the buyer go with it.
    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM buyers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(buyer_id = id, "Deleted buyer");
        Ok(())
    }
}
