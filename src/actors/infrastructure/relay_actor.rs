use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::HealthStatus;
use crate::outbox::{OutboxRelay, RelayReport};
use super::{HealthMonitorActor, UpdateHealth};

// ============================================================================
// Outbox Relay Actor - Drains the outbox on a timer
// ============================================================================
//
// Picks up events the request path left behind (deferred mode, printer or
// Redis outages). A tick that finds a pass still running is skipped.
//
// ============================================================================

const COMPONENT: &str = "outbox_relay";

/// Run one pass now and return what it did
#[derive(Message)]
#[rtype(result = "Result<RelayReport, String>")]
pub struct DrainOutbox;

pub struct OutboxRelayActor {
    relay: Arc<OutboxRelay>,
    poll_interval: Duration,
    health_monitor: Option<Addr<HealthMonitorActor>>,
}

impl OutboxRelayActor {
    pub fn new(relay: Arc<OutboxRelay>, poll_interval: Duration) -> Self {
        Self {
            relay,
            poll_interval,
            health_monitor: None,
        }
    }

    pub fn with_health_monitor(mut self, health_monitor: Addr<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    fn tick(&mut self, ctx: &mut Context<Self>) {
        let relay = self.relay.clone();
        let health_monitor = self.health_monitor.clone();

        ctx.spawn(
            async move {
                let Some(result) = relay.try_drain().await else {
                    tracing::debug!("⏭️  Outbox pass still running, skipping tick");
                    return;
                };

                let (status, details) = match result {
                    Ok(report) => (report_health(&report), None),
                    Err(e) => {
                        tracing::error!(error = %e, "Outbox pass failed");
                        (HealthStatus::Unhealthy("Outbox pass failed".to_string()), Some(e.to_string()))
                    }
                };

                if let Some(monitor) = health_monitor {
                    monitor.do_send(UpdateHealth { component: COMPONENT.to_string(), status, details });
                }
            }
            .into_actor(self),
        );
    }
}

fn report_health(report: &RelayReport) -> HealthStatus {
    if report.dead_lettered > 0 {
        HealthStatus::Degraded(format!("{} message(s) dead-lettered", report.dead_lettered))
    } else if report.failed > 0 {
        HealthStatus::Degraded(format!("{} message(s) awaiting retry", report.failed))
    } else {
        HealthStatus::Healthy
    }
}

impl Actor for OutboxRelayActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "OutboxRelayActor started");
        ctx.run_interval(self.poll_interval, |act, ctx| act.tick(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("OutboxRelayActor stopped");
    }
}

impl Handler<DrainOutbox> for OutboxRelayActor {
    type Result = ResponseFuture<Result<RelayReport, String>>;

    fn handle(&mut self, _msg: DrainOutbox, _ctx: &mut Self::Context) -> Self::Result {
        let relay = self.relay.clone();
        Box::pin(async move { relay.drain().await.map_err(|e| e.to_string()) })
    }
}
