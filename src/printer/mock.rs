//! In-memory [`PrintDispatcher`] for tests.
//!
//! Records every job it accepts and can be told to fail, either for the
//! next few calls or until it is brought back online.
//!
//! ```rust
//! use printshop_orders::printer::{MockPrinter, PrintDispatcher};
//! use printshop_orders::outbox::OrderApproved;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let printer = MockPrinter::new();
//! printer.fail_next(1, 503);
//!
//! let order = OrderApproved { order_id: 1, product_id: 1, design: "logo".into(), color: "red".into() };
//! assert!(printer.start_print(&order).await.is_err());
//! assert!(printer.start_print(&order).await.is_ok());
//! assert_eq!(printer.jobs().len(), 1);
//! # }
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::outbox::OrderApproved;
use super::{PrintDispatcher, PrinterError};

#[derive(Default)]
struct MockState {
    jobs: Vec<OrderApproved>,
    attempts: usize,
    scripted_failures: VecDeque<u16>,
    offline: bool,
}

#[derive(Default)]
pub struct MockPrinter {
    state: Mutex<MockState>,
}

impl MockPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `times` calls with HTTP `status`
    pub fn fail_next(&self, times: usize, status: u16) {
        let mut state = self.lock();
        state.scripted_failures.extend(std::iter::repeat(status).take(times));
    }

    /// While offline every call is rejected with 503
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Jobs started so far, in order
    pub fn jobs(&self) -> Vec<OrderApproved> {
        self.lock().jobs.clone()
    }

    /// Calls made, successful or not
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PrintDispatcher for MockPrinter {
    async fn start_print(&self, order: &OrderApproved) -> Result<(), PrinterError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.offline {
            return Err(PrinterError::Rejected { status: 503, body: "printer offline".into() });
        }
        if let Some(status) = state.scripted_failures.pop_front() {
            return Err(PrinterError::Rejected { status, body: "scripted failure".into() });
        }

        state.jobs.push(order.clone());
        Ok(())
    }
}
