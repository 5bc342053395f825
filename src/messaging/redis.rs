use async_trait::async_trait;
use redis::AsyncCommands;

use crate::config::BroadcastConfig;
use crate::utils::{CircuitBreaker, CircuitBreakerError, CircuitState};
use super::{BroadcastError, Broadcaster, ChannelMessage};

/// Publishes channel messages with Redis `PUBLISH {prefix}{group}`
pub struct RedisBroadcaster {
    client: redis::Client,
    channel_prefix: String,
    circuit_breaker: CircuitBreaker,
}

impl RedisBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Result<Self, BroadcastError> {
        let client = redis::Client::open(config.redis_url.as_str())?;

        Ok(Self {
            client,
            channel_prefix: config.channel_prefix.clone(),
            circuit_breaker: CircuitBreaker::new("broadcast", config.circuit_breaker.clone()),
        })
    }

    pub fn channel_name(&self, group: &str) -> String {
        format!("{}{}", self.channel_prefix, group)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let receivers: i64 = conn.publish(channel, payload).await?;
        Ok(receivers.max(0) as usize)
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn group_send(&self, group: &str, message: &ChannelMessage) -> Result<usize, BroadcastError> {
        let channel = self.channel_name(group);
        let payload = message.to_json()?;

        match self.circuit_breaker.call(self.publish(&channel, &payload)).await {
            Ok(receivers) => {
                tracing::info!(channel = %channel, receivers = receivers, kind = %message.kind, "Published to Redis");
                Ok(receivers)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(channel = %channel, "Circuit breaker open - Redis unavailable");
                Err(BroadcastError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(channel = %channel, error = %e, "Failed to publish to Redis");
                Err(BroadcastError::Redis(e))
            }
        }
    }

    async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn reset_circuit(&self) {
        self.circuit_breaker.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{CircuitBreakerConfig, IsTransient};

    fn config(redis_url: &str) -> BroadcastConfig {
        BroadcastConfig {
            redis_url: redis_url.to_string(),
            channel_prefix: "printshop:".to_string(),
            circuit_breaker: CircuitBreakerConfig { failure_threshold: 1, ..CircuitBreakerConfig::default() },
            ..BroadcastConfig::default()
        }
    }

    #[test]
    fn test_channel_name_uses_prefix() {
        let broadcaster = RedisBroadcaster::new(&config("redis://127.0.0.1/")).unwrap();
        assert_eq!(broadcaster.channel_name("orders"), "printshop:orders");
    }

    #[test]
    fn test_rejects_malformed_url() {
        assert!(matches!(RedisBroadcaster::new(&config("not-a-url")), Err(BroadcastError::Redis(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_opens_circuit() {
        // nothing listens on port 1
        let broadcaster = RedisBroadcaster::new(&config("redis://127.0.0.1:1/")).unwrap();
        let message = ChannelMessage::delivery_completed(1, "DHL");

        let err = broadcaster.group_send("orders", &message).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Redis(_)));
        assert!(err.is_transient());
        assert_eq!(broadcaster.circuit_state().await, CircuitState::Open);

        let err = broadcaster.group_send("orders", &message).await.unwrap_err();
        assert!(matches!(err, BroadcastError::CircuitOpen));

        broadcaster.reset_circuit().await;
        assert_eq!(broadcaster.circuit_state().await, CircuitState::Closed);
    }
}
