use actix::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::outbox::OutboxRelay;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health of printer, broadcast channel and outbox relay
// - Poll the circuit breakers of the external components
// - Aggregate system-wide health
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

/// Re-read circuit breaker states now
#[derive(Message)]
#[rtype(result = "()")]
pub struct RefreshHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    relay: Option<Arc<OutboxRelay>>,
    check_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(relay: Arc<OutboxRelay>, check_interval: Duration) -> Self {
        Self {
            components: HashMap::new(),
            relay: Some(relay),
            check_interval,
        }
    }

    /// Monitor that only knows what it is told through `UpdateHealth`
    pub fn standalone() -> Self {
        Self {
            components: HashMap::new(),
            relay: None,
            check_interval: Duration::from_secs(10),
        }
    }

    fn record(&mut self, component: &str, status: HealthStatus, details: Option<String>) {
        tracing::debug!(component = %component, status = ?status, "Updated component health");
        self.components.insert(
            component.to_string(),
            ComponentHealth::new(component, status).with_details(details),
        );
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");

        if self.relay.is_some() {
            ctx.notify(RefreshHealth);
            ctx.run_interval(self.check_interval, |_act, ctx| {
                ctx.notify(RefreshHealth);
            });
        }
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("HealthMonitorActor stopped");
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Self::Context) {
        self.record(&msg.component, msg.status, msg.details);
    }
}

impl Handler<RefreshHealth> for HealthMonitorActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: RefreshHealth, _ctx: &mut Self::Context) -> Self::Result {
        let relay = self.relay.clone();

        Box::pin(
            async move {
                match relay {
                    Some(relay) => relay.circuit_states().await,
                    None => Vec::new(),
                }
            }
            .into_actor(self)
            .map(|states, act, _ctx| {
                for (component, state) in states {
                    act.record(component, HealthStatus::from(state), None);
                }
            }),
        )
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
