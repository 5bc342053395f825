use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RecordId;

// ============================================================================
// Outbox Events
// ============================================================================
//
// Facts recorded together with the row that caused them. The payload column
// holds the whole tagged enum, so a stored message decodes on its own.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboxEvent {
    OrderApproved(OrderApproved),
    DeliveryCreated(DeliveryCreated),
}

/// An order was inserted with status `approved`; a print job is owed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: RecordId,
    pub product_id: RecordId,
    pub design: String,
    pub color: String,
}

/// A delivery was recorded; listeners of the broadcast group are told.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCreated {
    pub delivery_id: RecordId,
    pub order_id: RecordId,
    pub courier_name: String,
}

impl OutboxEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboxEvent::OrderApproved(_) => "OrderApproved",
            OutboxEvent::DeliveryCreated(_) => "DeliveryCreated",
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            OutboxEvent::OrderApproved(_) => "order",
            OutboxEvent::DeliveryCreated(_) => "delivery",
        }
    }

    pub fn aggregate_id(&self) -> RecordId {
        match self {
            OutboxEvent::OrderApproved(e) => e.order_id,
            OutboxEvent::DeliveryCreated(e) => e.delivery_id,
        }
    }
}

/// A row of `outbox_messages`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxMessage {
    pub seq: i64,
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: RecordId,
    pub event_type: String,
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub first_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn decode(&self) -> Result<OutboxEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }
}

/// A row of `dead_letter_queue`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: RecordId,
    pub event_type: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i64,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged() {
        let event = OutboxEvent::DeliveryCreated(DeliveryCreated {
            delivery_id: 3,
            order_id: 7,
            courier_name: "DHL".to_string(),
        });

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DeliveryCreated");
        assert_eq!(json["data"]["order_id"], 7);
        assert_eq!(event.aggregate_type(), "delivery");
        assert_eq!(event.aggregate_id(), 3);
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        let message = OutboxMessage {
            seq: 1,
            id: Uuid::new_v4(),
            aggregate_type: "order".to_string(),
            aggregate_id: 1,
            event_type: "OrderShipped".to_string(),
            payload: r#"{"type":"OrderShipped","data":{}}"#.to_string(),
            attempts: 0,
            last_error: None,
            first_failed_at: None,
            created_at: Utc::now(),
            dispatched_at: None,
        };

        assert!(message.decode().is_err());
        assert!(!message.is_dispatched());
    }
}
