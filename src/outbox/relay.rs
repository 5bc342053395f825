use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::RelayConfig;
use crate::messaging::{BroadcastError, Broadcaster, ChannelMessage};
use crate::metrics::Metrics;
use crate::printer::{PrintDispatcher, PrinterError};
use crate::utils::{retry_on_transient, CircuitState, IsTransient, RetryResult};
use super::event::{OutboxEvent, OutboxMessage};
use super::store::OutboxStore;
use super::DeadLetter;

// ============================================================================
// Outbox Relay
// ============================================================================
//
// One pass walks the pending messages by seq. Per message:
//
//   decode --fails--> dead letter
//   dispatch with retry_on_transient
//     ok                -> mark dispatched
//     permanent error   -> dead letter
//     retries exhausted -> attempts + 1; dead letter once max_delivery_attempts
//
// The cursor only moves forward, so a failing message is looked at once per
// pass and never holds up the ones behind it.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Printer(#[from] PrinterError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error("Undecodable outbox payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IsTransient for DispatchError {
    fn is_transient(&self) -> bool {
        match self {
            DispatchError::Printer(e) => e.is_transient(),
            DispatchError::Broadcast(e) => e.is_transient(),
            DispatchError::Decode(_) => false,
        }
    }
}

/// What one drain pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub dispatched: usize,
    /// Still pending, will be tried again on a later pass
    pub failed: usize,
    pub dead_lettered: usize,
}

impl RelayReport {
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0 && self.failed == 0 && self.dead_lettered == 0
    }
}

enum Outcome {
    Dispatched,
    Failed,
    DeadLettered,
}

pub struct OutboxRelay {
    outbox: OutboxStore,
    printer: Arc<dyn PrintDispatcher>,
    broadcaster: Arc<dyn Broadcaster>,
    group: String,
    config: RelayConfig,
    metrics: Option<Arc<Metrics>>,
    drain_lock: Mutex<()>,
}

impl OutboxRelay {
    pub fn new(
        outbox: OutboxStore,
        printer: Arc<dyn PrintDispatcher>,
        broadcaster: Arc<dyn Broadcaster>,
        group: impl Into<String>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            printer,
            broadcaster,
            group: group.into(),
            config,
            metrics: None,
            drain_lock: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Deliver everything currently pending. Waits for a running pass first.
    pub async fn drain(&self) -> anyhow::Result<RelayReport> {
        let _guard = self.drain_lock.lock().await;
        self.drain_pass().await
    }

    /// Like `drain`, but returns `None` right away if a pass is already running
    pub async fn try_drain(&self) -> Option<anyhow::Result<RelayReport>> {
        let _guard = self.drain_lock.try_lock().ok()?;
        Some(self.drain_pass().await)
    }

    async fn drain_pass(&self) -> anyhow::Result<RelayReport> {
        let mut report = RelayReport::default();
        let mut cursor = 0;
        let batch_size = self.config.batch_size.max(1);

        loop {
            let batch = self.outbox.fetch_pending(cursor, batch_size).await?;
            let batch_len = batch.len();

            for message in &batch {
                cursor = message.seq;
                match self.process(message).await? {
                    Outcome::Dispatched => report.dispatched += 1,
                    Outcome::Failed => report.failed += 1,
                    Outcome::DeadLettered => report.dead_lettered += 1,
                }
            }

            if batch_len < batch_size as usize {
                break;
            }
        }

        if !report.is_empty() {
            tracing::info!(
                dispatched = report.dispatched,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "Outbox pass finished"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_pending(self.outbox.pending_count().await?);
            for (component, state) in self.circuit_states().await {
                metrics.update_circuit_breaker_state(component, state.as_gauge());
            }
        }

        Ok(report)
    }

    async fn process(&self, message: &OutboxMessage) -> anyhow::Result<Outcome> {
        let event = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                let error = DispatchError::Decode(e);
                tracing::error!(event_id = %message.id, event_type = %message.event_type, error = %error, "Cannot decode outbox message");
                self.dead_letter(message, &error.to_string()).await?;
                return Ok(Outcome::DeadLettered);
            }
        };

        let event_type = event.event_type();
        let started = Instant::now();
        let mut attempts_made = 0;

        let result = retry_on_transient(&self.config.retry, |attempt| {
            attempts_made = attempt;
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt(event_type, attempt);
                }
            }
            self.dispatch(&event)
        })
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        let retried = attempts_made > 1;

        match result {
            RetryResult::Success(()) => {
                if !self.outbox.mark_dispatched(message.id).await? {
                    tracing::warn!(event_id = %message.id, "Outbox message was already marked dispatched");
                }
                self.record(event_type, elapsed, retried, true, "");
                tracing::info!(event_id = %message.id, event_type = %event_type, aggregate_id = message.aggregate_id, "✅ Dispatched outbox event");
                Ok(Outcome::Dispatched)
            }
            RetryResult::PermanentFailure { error, .. } => {
                self.record(event_type, elapsed, retried, false, "permanent");
                self.dead_letter(message, &error.to_string()).await?;
                Ok(Outcome::DeadLettered)
            }
            RetryResult::Failed { error, attempts } => {
                self.record(event_type, elapsed, retried, false, "transient");
                let passes = self.outbox.record_failure(message.id, &error.to_string()).await?;

                if passes >= i64::from(self.config.max_delivery_attempts.max(1)) {
                    self.dead_letter(message, &error.to_string()).await?;
                    return Ok(Outcome::DeadLettered);
                }

                tracing::warn!(
                    event_id = %message.id,
                    event_type = %event_type,
                    attempts = attempts,
                    failed_passes = passes,
                    error = %error,
                    "Outbox dispatch failed, will retry on a later pass"
                );
                Ok(Outcome::Failed)
            }
        }
    }

    async fn dispatch(&self, event: &OutboxEvent) -> Result<(), DispatchError> {
        match event {
            OutboxEvent::OrderApproved(order) => {
                self.printer.start_print(order).await?;
            }
            OutboxEvent::DeliveryCreated(delivery) => {
                let message = ChannelMessage::delivery_completed(delivery.order_id, &delivery.courier_name);
                self.broadcaster.group_send(&self.group, &message).await?;
            }
        }
        Ok(())
    }

    async fn dead_letter(&self, message: &OutboxMessage, error: &str) -> anyhow::Result<()> {
        self.outbox.dead_letter(message.id, error).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_dlq_message(&message.event_type);
        }
        Ok(())
    }

    fn record(&self, event_type: &str, elapsed: f64, retried: bool, success: bool, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(event_type, elapsed, success, reason);
            if retried {
                metrics.record_retry_outcome(event_type, success);
            }
        }
    }

    /// Circuit state of each external component the relay talks to
    pub async fn circuit_states(&self) -> Vec<(&'static str, CircuitState)> {
        vec![
            ("printer", self.printer.circuit_state().await),
            ("broadcast", self.broadcaster.circuit_state().await),
        ]
    }

    /// Close both circuits, e.g. once an operator brought the printer back
    pub async fn reset_circuits(&self) {
        self.printer.reset_circuit().await;
        self.broadcaster.reset_circuit().await;
        tracing::info!("Printer and broadcast circuits reset");
    }

    pub async fn pending_count(&self) -> anyhow::Result<i64> {
        Ok(self.outbox.pending_count().await?)
    }

    pub async fn dead_letters(&self, limit: u32) -> anyhow::Result<Vec<DeadLetter>> {
        Ok(self.outbox.dead_letters(limit).await?)
    }

    pub async fn requeue_dead_letter(&self, id: uuid::Uuid) -> anyhow::Result<bool> {
        Ok(self.outbox.requeue_dead_letter(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{fixture, new_order, Fixture};
    use crate::messaging::LocalBroadcaster;
    use crate::models::{NewDelivery, OrderStatus};
    use crate::printer::MockPrinter;
    use crate::utils::RetryConfig;
    use std::time::Duration;

    struct Harness {
        f: Fixture,
        printer: Arc<MockPrinter>,
        bus: Arc<LocalBroadcaster>,
        relay: OutboxRelay,
    }

    fn quick_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    async fn harness(config: RelayConfig) -> Harness {
        let f = fixture().await;
        let printer = Arc::new(MockPrinter::new());
        let bus = Arc::new(LocalBroadcaster::default());
        let relay = OutboxRelay::new(f.db.outbox(), printer.clone(), bus.clone(), "orders", config)
            .with_metrics(Arc::new(Metrics::new().unwrap()));
        Harness { f, printer, bus, relay }
    }

    fn single_attempt(max_delivery_attempts: u32) -> RelayConfig {
        RelayConfig { retry: RetryConfig::no_retry(), max_delivery_attempts, ..RelayConfig::default() }
    }

    #[tokio::test]
    async fn test_approved_order_prints_once() {
        let h = harness(single_attempt(5)).await;
        let order = h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();

        let first = h.relay.drain().await.unwrap();
        let second = h.relay.drain().await.unwrap();

        assert_eq!(first, RelayReport { dispatched: 1, failed: 0, dead_lettered: 0 });
        assert!(second.is_empty());
        let jobs = h.printer.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].order_id, order.id);
        assert_eq!(h.relay.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delivery_is_broadcast_to_group() {
        let h = harness(single_attempt(5)).await;
        let mut listener = h.bus.subscribe("orders");
        let order = h.f.db.orders().create(&new_order(&h.f, OrderStatus::Complete)).await.unwrap();
        h.f.db
            .deliveries()
            .create(&NewDelivery { order_id: order.id, courier_name: "DHL".into() })
            .await
            .unwrap();

        let report = h.relay.drain().await.unwrap();

        assert_eq!(report.dispatched, 1);
        let received = listener.recv().await.unwrap();
        assert_eq!(received.message.order_id, order.id);
        assert_eq!(received.message.courier_name, "DHL");
        assert_eq!(received.message.status, "Delivered");
        assert!(listener.try_recv().is_err());
        assert!(h.printer.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_retried_within_pass() {
        let h = harness(RelayConfig { retry: quick_retry(3), ..RelayConfig::default() }).await;
        h.printer.fail_next(2, 503);
        h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();

        let report = h.relay.drain().await.unwrap();

        assert_eq!(report.dispatched, 1);
        assert_eq!(h.printer.attempts(), 3);
        assert_eq!(h.printer.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_message_does_not_block_the_rest() {
        let h = harness(single_attempt(5)).await;
        h.printer.fail_next(1, 503);
        let first = h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();
        let second = h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();

        let report = h.relay.drain().await.unwrap();
        assert_eq!(report, RelayReport { dispatched: 1, failed: 1, dead_lettered: 0 });
        assert_eq!(h.printer.jobs()[0].order_id, second.id);

        let report = h.relay.drain().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let printed: Vec<_> = h.printer.jobs().into_iter().map(|j| j.order_id).collect();
        assert_eq!(printed, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_passes_then_requeue() {
        let h = harness(single_attempt(2)).await;
        h.printer.set_offline(true);
        h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();

        assert_eq!(h.relay.drain().await.unwrap().failed, 1);
        assert_eq!(h.relay.drain().await.unwrap().dead_lettered, 1);
        assert_eq!(h.relay.pending_count().await.unwrap(), 0);

        let letters = h.relay.dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].failure_count, 2);
        assert_eq!(letters[0].event_type, "OrderApproved");

        h.printer.set_offline(false);
        assert!(h.relay.requeue_dead_letter(letters[0].id).await.unwrap());
        assert_eq!(h.relay.drain().await.unwrap().dispatched, 1);
        assert_eq!(h.printer.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_dead_letters_immediately() {
        let h = harness(RelayConfig { retry: quick_retry(3), ..RelayConfig::default() }).await;
        h.printer.fail_next(1, 404);
        h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();

        let report = h.relay.drain().await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(h.printer.attempts(), 1);
        assert!(h.printer.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dead_lettered() {
        let h = harness(single_attempt(5)).await;
        sqlx::query(
            "INSERT INTO outbox_messages (id, aggregate_type, aggregate_id, event_type, payload, created_at)
             VALUES (?, 'order', 1, 'OrderApproved', '{not json', ?)",
        )
        .bind(uuid::Uuid::now_v7())
        .bind(chrono::Utc::now())
        .execute(h.f.db.pool())
        .await
        .unwrap();

        let report = h.relay.drain().await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(h.printer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_batches_cover_whole_backlog() {
        let h = harness(RelayConfig { batch_size: 2, ..single_attempt(5) }).await;
        for _ in 0..5 {
            h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();
        }

        let report = h.relay.drain().await.unwrap();

        assert_eq!(report.dispatched, 5);
        assert_eq!(h.printer.jobs().len(), 5);
    }

    #[tokio::test]
    async fn test_zero_batch_size_still_finishes_pass() {
        let h = harness(RelayConfig { batch_size: 0, ..single_attempt(5) }).await;
        for _ in 0..3 {
            h.f.db.orders().create(&new_order(&h.f, OrderStatus::Approved)).await.unwrap();
        }

        let report = tokio::time::timeout(Duration::from_secs(3), h.relay.drain())
            .await
            .expect("drain with batch_size 0 did not return")
            .unwrap();

        assert_eq!(report.dispatched, 3);
        assert_eq!(h.printer.jobs().len(), 3);
        assert!(h.relay.try_drain().await.is_some());
    }

    #[tokio::test]
    async fn test_try_drain_when_idle() {
        let h = harness(single_attempt(5)).await;
        let report = h.relay.try_drain().await.unwrap().unwrap();
        assert!(report.is_empty());
        assert_eq!(
            h.relay.circuit_states().await,
            vec![("printer", CircuitState::Closed), ("broadcast", CircuitState::Closed)]
        );
    }
}
