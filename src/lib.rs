//! Order records for a print supply chain (suppliers, buyers, products,
//! orders, deliveries) on SQLite, with the two side effects of a write
//! (starting a 3D print for an approved order, announcing a delivery to
//! the `orders` broadcast group) delivered through a transactional outbox.

pub mod actors;
pub mod config;
pub mod db;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod outbox;
pub mod printer;
pub mod service;
pub mod utils;

pub use config::Config;
pub use db::{Database, StoreError, StoreResult};
pub use service::OrderService;
