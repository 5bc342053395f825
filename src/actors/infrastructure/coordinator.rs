use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::HealthStatus;
use crate::outbox::OutboxRelay;
use super::{GetSystemHealth, HealthMonitorActor, OutboxRelayActor, RefreshHealth, SystemHealth, UpdateHealth};

// ============================================================================
// Coordinator Actor - Orchestrates all system actors
// ============================================================================
//
// Responsibilities:
// - Starts the child actors and owns their addresses
// - Logs system health periodically
// - Coordinates graceful shutdown
//
// Actor Hierarchy:
//   CoordinatorActor
//   ├── OutboxRelayActor
//   └── HealthMonitorActor
//
// ============================================================================

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub struct CoordinatorActor {
    relay: Arc<OutboxRelay>,
    health_check_interval: Duration,
    relay_actor: Option<Addr<OutboxRelayActor>>,
    health_monitor: Option<Addr<HealthMonitorActor>>,
}

impl CoordinatorActor {
    pub fn new(relay: Arc<OutboxRelay>) -> Self {
        Self {
            relay,
            health_check_interval: Duration::from_secs(10),
            relay_actor: None,
            health_monitor: None,
        }
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    fn start_child_actors(&mut self) {
        tracing::info!("Starting child actors");

        let health_monitor = HealthMonitorActor::new(self.relay.clone(), self.health_check_interval).start();
        self.health_monitor = Some(health_monitor.clone());

        let poll_interval = Duration::from_millis(self.relay.config().poll_interval_ms.max(1));
        let relay_actor = OutboxRelayActor::new(self.relay.clone(), poll_interval)
            .with_health_monitor(health_monitor.clone())
            .start();
        self.relay_actor = Some(relay_actor);

        health_monitor.do_send(UpdateHealth {
            component: "outbox_relay".to_string(),
            status: HealthStatus::Healthy,
            details: Some("Outbox relay started".to_string()),
        });

        tracing::info!("✅ All child actors started successfully");
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors();

        ctx.run_interval(HEALTH_LOG_INTERVAL, |act, _ctx| {
            if let Some(ref health_monitor) = act.health_monitor {
                let health_monitor = health_monitor.clone();
                actix::spawn(async move {
                    match health_monitor.send(GetSystemHealth).await {
                        Ok(health) => match health.overall_status {
                            HealthStatus::Healthy => {
                                tracing::debug!("System health check: Healthy");
                            }
                            HealthStatus::Degraded(ref msg) => {
                                tracing::warn!("System health check: Degraded - {}", msg);
                            }
                            HealthStatus::Unhealthy(ref msg) => {
                                tracing::error!("System health check: Unhealthy - {}", msg);
                            }
                        },
                        Err(e) => {
                            tracing::error!("Failed to get system health: {}", e);
                        }
                    }
                });
            }
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        tracing::info!("🛑 CoordinatorActor stopping - initiating graceful shutdown");
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<(), String>")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = Result<(), String>;

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");

        if let Some(relay_actor) = self.relay_actor.take() {
            relay_actor.do_send(StopActor);
        }

        if let Some(health_monitor) = self.health_monitor.take() {
            health_monitor.do_send(StopActor);
        }

        ctx.stop();

        Ok(())
    }
}

impl Handler<GetSystemHealth> for CoordinatorActor {
    type Result = ResponseFuture<SystemHealth>;

    fn handle(&mut self, msg: GetSystemHealth, _ctx: &mut Self::Context) -> Self::Result {
        let health_monitor = self.health_monitor.clone();

        Box::pin(async move {
            let unavailable = || SystemHealth {
                overall_status: HealthStatus::Unhealthy("Health monitor not running".to_string()),
                components: Default::default(),
                check_time: chrono::Utc::now(),
            };

            match health_monitor {
                Some(monitor) => monitor.send(msg).await.unwrap_or_else(|_| unavailable()),
                None => unavailable(),
            }
        })
    }
}

/// Close the printer and broadcast circuits, then refresh health
#[derive(Message)]
#[rtype(result = "()")]
pub struct ResetCircuits;

impl Handler<ResetCircuits> for CoordinatorActor {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, _msg: ResetCircuits, _ctx: &mut Self::Context) -> Self::Result {
        let relay = self.relay.clone();
        let health_monitor = self.health_monitor.clone();

        Box::pin(async move {
            relay.reset_circuits().await;
            if let Some(monitor) = health_monitor {
                if let Err(e) = monitor.send(RefreshHealth).await {
                    tracing::warn!("Health refresh after circuit reset failed: {}", e);
                }
            }
        })
    }
}

/// Message to gracefully stop an actor
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("OutboxRelayActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}
