// ============================================================================
// Core Actor Types
// ============================================================================

pub mod health;

pub use health::*;
