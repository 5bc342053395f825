mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Outbox dispatch (throughput, latency, failures by reason)
// - Retry attempts and outcomes
// - Dead letter queue
// - Circuit breaker state per external component
// - Pending outbox backlog
//
// Scraped via /metrics, see server.rs
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Outbox dispatch
    pub outbox_events_dispatched: IntCounterVec,
    pub outbox_events_failed: IntCounterVec,
    pub outbox_dispatch_duration: HistogramVec,
    pub outbox_pending: IntGauge,

    // Retry
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // DLQ
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_event_type: IntCounterVec,

    // Circuit breakers
    pub circuit_breaker_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let outbox_events_dispatched = IntCounterVec::new(
            Opts::new("outbox_events_dispatched_total", "Outbox events delivered to their target"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_events_dispatched.clone()))?;

        let outbox_events_failed = IntCounterVec::new(
            Opts::new("outbox_events_failed_total", "Outbox dispatch passes that did not deliver"),
            &["event_type", "reason"],
        )?;
        registry.register(Box::new(outbox_events_failed.clone()))?;

        let outbox_dispatch_duration = HistogramVec::new(
            HistogramOpts::new("outbox_dispatch_duration_seconds", "Time spent dispatching one outbox event, retries included")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_dispatch_duration.clone()))?;

        let outbox_pending = IntGauge::new("outbox_pending_messages", "Outbox messages not yet dispatched")?;
        registry.register(Box::new(outbox_pending.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that succeeded after retrying"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Operations that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        let dlq_messages_total = IntCounter::new("dlq_messages_total", "Total messages moved to the dead letter queue")?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_event_type = IntCounterVec::new(
            Opts::new("dlq_messages_by_event_type", "DLQ messages by event type"),
            &["event_type"],
        )?;
        registry.register(Box::new(dlq_messages_by_event_type.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["component"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            outbox_events_dispatched,
            outbox_events_failed,
            outbox_dispatch_duration,
            outbox_pending,
            retry_attempts_total,
            retry_success,
            retry_failure,
            dlq_messages_total,
            dlq_messages_by_event_type,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `reason` is ignored on success
    pub fn record_dispatch(&self, event_type: &str, duration_secs: f64, success: bool, reason: &str) {
        if success {
            self.outbox_events_dispatched.with_label_values(&[event_type]).inc();
        } else {
            self.outbox_events_failed.with_label_values(&[event_type, reason]).inc();
        }
        self.outbox_dispatch_duration.with_label_values(&[event_type]).observe(duration_secs);
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn record_dlq_message(&self, event_type: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_event_type.with_label_values(&[event_type]).inc();
    }

    pub fn set_pending(&self, pending: i64) {
        self.outbox_pending.set(pending);
    }

    pub fn update_circuit_breaker_state(&self, component: &str, state: i64) {
        self.circuit_breaker_state.with_label_values(&[component]).set(state);
    }
}
