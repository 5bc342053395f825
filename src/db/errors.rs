use crate::models::{FieldError, RecordId};

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid {entity}: {source}")]
    Validation {
        entity: &'static str,
        #[source]
        source: FieldError,
    },

    #[error("{entity} named '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error("Account {account_id} already has a {entity}")]
    AccountTaken { entity: &'static str, account_id: RecordId },

    #[error("{entity} references a record that does not exist")]
    MissingReference { entity: &'static str },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: RecordId },

    #[error("Outbox message {0} not found")]
    MessageNotFound(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to encode outbox payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(entity: &'static str) -> impl FnOnce(FieldError) -> StoreError {
        move |source| StoreError::Validation { entity, source }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::MessageNotFound(_))
    }
}

/// Translate constraint violations raised by an INSERT into typed errors.
///
/// `name` is the value of the table's unique name column, if it has one.
pub(crate) fn classify_insert_error(entity: &'static str, name: Option<&str>, account_id: Option<RecordId>, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if let (Some(account_id), true) = (account_id, message.contains("account_id")) {
                return StoreError::AccountTaken { entity, account_id };
            }
            if let Some(name) = name {
                return StoreError::Duplicate { entity, name: name.to_string() };
            }
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::MissingReference { entity };
        }
    }
    StoreError::Database(err)
}
