use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{StoreError, StoreResult};
use super::event::{DeadLetter, OutboxEvent, OutboxMessage};

// ============================================================================
// Outbox Storage
// ============================================================================
//
// `enqueue` runs on the caller's transaction so the event commits or rolls
// back with its record. Everything else is used by the relay:
//
//   pending --dispatch ok--> dispatched_at set (never picked up again)
//   pending --dispatch failed--> attempts + 1, still pending
//   pending --gave up--> moved to dead_letter_queue
//   dead letter --requeue--> pending again, attempts reset
//
// ============================================================================

const MESSAGE_COLUMNS: &str = "seq, id, aggregate_type, aggregate_id, event_type, payload, attempts, \
                               last_error, first_failed_at, created_at, dispatched_at";

/// Write `event` to the outbox on an open transaction.
pub(crate) async fn enqueue(conn: &mut SqliteConnection, event: &OutboxEvent) -> StoreResult<Uuid> {
    let id = Uuid::now_v7();
    let payload = serde_json::to_string(event)?;

    sqlx::query(
        "INSERT INTO outbox_messages (id, aggregate_type, aggregate_id, event_type, payload, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(event.aggregate_type())
    .bind(event.aggregate_id())
    .bind(event.event_type())
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        event_id = %id,
        event_type = event.event_type(),
        aggregate_id = event.aggregate_id(),
        "Enqueued outbox event"
    );

    Ok(id)
}

#[derive(Clone)]
pub struct OutboxStore {
    pool: SqlitePool,
}

impl OutboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Undispatched messages with `seq > after_seq`, oldest first
    pub async fn fetch_pending(&self, after_seq: i64, limit: u32) -> StoreResult<Vec<OutboxMessage>> {
        Ok(sqlx::query_as::<_, OutboxMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbox_messages
             WHERE dispatched_at IS NULL AND seq > ?
             ORDER BY seq
             LIMIT ?"
        ))
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<OutboxMessage>> {
        Ok(sqlx::query_as::<_, OutboxMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbox_messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_for_aggregate(&self, aggregate_type: &str, aggregate_id: i64) -> StoreResult<Vec<OutboxMessage>> {
        Ok(sqlx::query_as::<_, OutboxMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbox_messages
             WHERE aggregate_type = ? AND aggregate_id = ?
             ORDER BY seq"
        ))
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn pending_count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outbox_messages WHERE dispatched_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Returns false when the message was already dispatched or is gone
    pub async fn mark_dispatched(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET dispatched_at = ?, last_error = NULL
             WHERE id = ? AND dispatched_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Count one failed delivery pass; returns the new attempt count
    pub async fn record_failure(&self, id: Uuid, error: &str) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE outbox_messages
             SET attempts = attempts + 1, last_error = ?, first_failed_at = COALESCE(first_failed_at, ?)
             WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let attempts: Option<(i64,)> = sqlx::query_as("SELECT attempts FROM outbox_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        attempts
            .map(|(attempts,)| attempts)
            .ok_or(StoreError::MessageNotFound(id))
    }

    /// Move a message into the dead-letter queue
    pub async fn dead_letter(&self, id: Uuid, error: &str) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, OutboxMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbox_messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::MessageNotFound(id))?;

        sqlx::query(
            "INSERT INTO dead_letter_queue (
                id, aggregate_type, aggregate_id, event_type, payload,
                error_message, failure_count, first_failed_at, last_failed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id)
        .bind(&message.aggregate_type)
        .bind(message.aggregate_id)
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(error)
        .bind(message.attempts.max(1))
        .bind(message.first_failed_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM outbox_messages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::error!(
            event_id = %id,
            event_type = %message.event_type,
            aggregate_id = message.aggregate_id,
            error = %error,
            failure_count = message.attempts.max(1),
            "💀 Moved outbox message to dead letter queue"
        );

        Ok(())
    }

    pub async fn dead_letters(&self, limit: u32) -> StoreResult<Vec<DeadLetter>> {
        Ok(sqlx::query_as::<_, DeadLetter>(
            "SELECT id, aggregate_type, aggregate_id, event_type, payload, error_message,
                    failure_count, first_failed_at, last_failed_at
             FROM dead_letter_queue
             ORDER BY last_failed_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Put a dead letter back in line with a clean attempt count.
    /// Returns false if there is no such dead letter.
    pub async fn requeue_dead_letter(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let letter = sqlx::query_as::<_, DeadLetter>(
            "SELECT id, aggregate_type, aggregate_id, event_type, payload, error_message,
                    failure_count, first_failed_at, last_failed_at
             FROM dead_letter_queue WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(letter) = letter else {
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO outbox_messages (id, aggregate_type, aggregate_id, event_type, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(letter.id)
        .bind(&letter.aggregate_type)
        .bind(letter.aggregate_id)
        .bind(&letter.event_type)
        .bind(&letter.payload)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM dead_letter_queue WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(event_id = %id, event_type = %letter.event_type, "Requeued dead letter");
        Ok(true)
    }
}
