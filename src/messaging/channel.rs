use serde::{Deserialize, Serialize};

use crate::models::RecordId;

/// Message type listeners dispatch on
pub const DELIVERY_MESSAGE: &str = "delivery_message";
pub const DELIVERED: &str = "Delivered";

/// Envelope sent to a broadcast group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: DeliveryNotice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNotice {
    pub order_id: RecordId,
    pub courier_name: String,
    pub status: String,
    pub message: String,
}

impl ChannelMessage {
    pub fn delivery_completed(order_id: RecordId, courier_name: &str) -> Self {
        Self {
            kind: DELIVERY_MESSAGE.to_string(),
            message: DeliveryNotice {
                order_id,
                courier_name: courier_name.to_string(),
                status: DELIVERED.to_string(),
                message: format!("Delivery for Order {} has been completed.", order_id),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
