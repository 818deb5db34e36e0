// =============================================================================
// Outcome Tracker (C8)
// =============================================================================

pub mod barrier;
pub mod tracker;

pub use tracker::{run_outcome_poller, try_open, OpenPositionRequest};
