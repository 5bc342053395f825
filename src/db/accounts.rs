use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Account, NewAccount, RecordId};
use super::{classify_insert_error, StoreError, StoreResult};

const ENTITY: &str = "account";

/// Login identities that suppliers and buyers hang off
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewAccount) -> StoreResult<Account> {
        new.validate().map_err(StoreError::validation(ENTITY))?;
        let created_at = Utc::now();

        let id = sqlx::query("INSERT INTO accounts (username, email, created_at) VALUES (?, ?, ?)")
            .bind(&new.username)
            .bind(&new.email)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_insert_error(ENTITY, Some(&new.username), None, e))?
            .last_insert_rowid();

        tracing::debug!(account_id = id, username = %new.username, "Created account");

        Ok(Account {
            id,
            username: new.username.clone(),
            email: new.email.clone(),
            created_at,
        })
    }

    pub async fn get(&self, id: RecordId) -> StoreResult<Account> {
        sqlx::query_as::<_, Account>("SELECT id, username, email, created_at FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: ENTITY, id })
    }

    pub async fn list(&self) -> StoreResult<Vec<Account>> {
        Ok(sqlx::query_as::<_, Account>("SELECT id, username, email, created_at FROM accounts ORDER BY username")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Removes the account together with its supplier/buyer profiles and
    /// everything those own.
    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: ENTITY, id });
        }
        tracing::info!(account_id = id, "Deleted account");
        Ok(())
    }
}
