// ============================================================================
// Print Dispatch
// ============================================================================
//
// An approved order owes exactly one print job. The relay hands the
// OrderApproved event to a PrintDispatcher; OctoPrint is the real one,
// MockPrinter stands in for tests.
//
// ============================================================================

mod mock;
mod octoprint;

pub use mock::MockPrinter;
pub use octoprint::OctoPrintClient;

use async_trait::async_trait;

use crate::outbox::OrderApproved;
use crate::utils::{CircuitState, IsTransient};

#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("Printer request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Printer rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Circuit breaker open for printer")]
    CircuitOpen,

    #[error("Invalid printer URL: {0}")]
    InvalidUrl(String),
}

impl IsTransient for PrinterError {
    fn is_transient(&self) -> bool {
        match self {
            PrinterError::Transport(_) | PrinterError::CircuitOpen => true,
            // 409: printer busy or not operational yet
            PrinterError::Rejected { status, .. } => *status >= 500 || *status == 409,
            PrinterError::InvalidUrl(_) => false,
        }
    }
}

#[async_trait]
pub trait PrintDispatcher: Send + Sync {
    /// Select the job file and start printing it for `order`
    async fn start_print(&self, order: &OrderApproved) -> Result<(), PrinterError>;

    async fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }

    /// Close the circuit after the printer was fixed by hand
    async fn reset_circuit(&self) {}
}
