// ============================================================================
// Real-time Broadcast
// ============================================================================
//
// Group fan-out for delivery notices. Listeners subscribed at send time get
// the message; nothing is kept for late subscribers. Redis PUBLISH across
// processes, or an in-process tokio broadcast bus.
//
// ============================================================================

mod channel;
mod local;
mod redis;

pub use channel::{ChannelMessage, DeliveryNotice, DELIVERY_MESSAGE, DELIVERED};
pub use local::LocalBroadcaster;
pub use self::redis::RedisBroadcaster;

use async_trait::async_trait;

use crate::utils::{CircuitState, IsTransient};

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Failed to encode channel message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Circuit breaker open for broadcast channel")]
    CircuitOpen,
}

impl IsTransient for BroadcastError {
    fn is_transient(&self) -> bool {
        !matches!(self, BroadcastError::Serialization(_))
    }
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Send `message` to everyone listening on `group`.
    /// Returns how many listeners received it; zero is not an error.
    async fn group_send(&self, group: &str, message: &ChannelMessage) -> Result<usize, BroadcastError>;

    async fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }

    async fn reset_circuit(&self) {}
}
