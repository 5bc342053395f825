use std::sync::Arc;

use crate::config::PostCommit;
use crate::db::{Database, StoreResult};
use crate::models::{Delivery, NewDelivery, NewOrder, Order, OrderStatus, RecordId};
use crate::outbox::OutboxRelay;

// ============================================================================
// Order Service
// ============================================================================
//
// The writes that carry side effects. Each commits first; the side effect
// follows from the outbox, so a printer or Redis outage never fails the
// write itself.
//
//   Immediate: drain the outbox inline after commit, errors only logged
//   Deferred:  return after commit, OutboxRelayActor delivers on its tick
//
// ============================================================================

#[derive(Clone)]
pub struct OrderService {
    db: Database,
    relay: Arc<OutboxRelay>,
    post_commit: PostCommit,
}

impl OrderService {
    pub fn new(db: Database, relay: Arc<OutboxRelay>) -> Self {
        let post_commit = relay.config().post_commit;
        Self { db, relay, post_commit }
    }

    pub fn with_post_commit(mut self, post_commit: PostCommit) -> Self {
        self.post_commit = post_commit;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn relay(&self) -> &Arc<OutboxRelay> {
        &self.relay
    }

    pub async fn create_order(&self, new: &NewOrder) -> StoreResult<Order> {
        let order = self.db.orders().create(new).await?;
        if order.status.prints_on_create() {
            self.after_commit("order", order.id).await;
        }
        Ok(order)
    }

    pub async fn create_delivery(&self, new: &NewDelivery) -> StoreResult<Delivery> {
        let delivery = self.db.deliveries().create(new).await?;
        self.after_commit("delivery", delivery.id).await;
        Ok(delivery)
    }

    /// Plain status change, never triggers a print
    pub async fn update_order_status(&self, id: RecordId, status: OrderStatus) -> StoreResult<Order> {
        self.db.orders().update_status(id, status).await
    }

    async fn after_commit(&self, entity: &'static str, id: RecordId) {
        if self.post_commit == PostCommit::Deferred {
            tracing::debug!(entity = entity, id = id, "Outbox event left for the relay actor");
            return;
        }

        match self.relay.drain().await {
            Ok(report) => {
                tracing::debug!(
                    entity = entity,
                    id = id,
                    dispatched = report.dispatched,
                    failed = report.failed,
                    "Post-commit outbox pass done"
                );
            }
            Err(e) => {
                tracing::warn!(entity = entity, id = id, error = %e, "Post-commit outbox pass failed, relay actor will retry");
            }
        }
    }
}
