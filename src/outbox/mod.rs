// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Side effects of a write (starting a print, announcing a delivery) are
// stored as outbox rows in the write's own transaction, then delivered
// after commit by the relay. A committed write always has its event; an
// event is only ever produced by a committed write.
//
// ============================================================================

mod event;
mod relay;
mod store;

pub use event::{DeadLetter, DeliveryCreated, OrderApproved, OutboxEvent, OutboxMessage};
pub use relay::{DispatchError, OutboxRelay, RelayReport};
pub use store::OutboxStore;

pub(crate) use store::enqueue;
