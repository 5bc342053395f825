// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Outbox relay on a timer
// - Health monitoring
// - Coordination and shutdown
//
// ============================================================================

mod coordinator;
mod health_monitor;
mod relay_actor;

pub use coordinator::{CoordinatorActor, ResetCircuits, Shutdown};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, RefreshHealth, SystemHealth, UpdateHealth};
pub use relay_actor::{DrainOutbox, OutboxRelayActor};
