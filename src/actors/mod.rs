// ============================================================================
// Actors Module
// ============================================================================
//
// Background infrastructure running inside the actix system.
//
// Structure:
// - core/           - Health types shared by the actors
// - infrastructure/ - Relay, health monitor and coordinator actors
//
// Writes never go through an actor; they commit on the caller's task and
// the actors only deliver what the outbox holds.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    CoordinatorActor,
    DrainOutbox,
    GetSystemHealth,
    HealthMonitorActor,
    OutboxRelayActor,
    RefreshHealth,
    ResetCircuits,
    Shutdown,
    SystemHealth,
    UpdateHealth,
};
