// =============================================================================
// Signal Generator (C6)
// =============================================================================
//
// `strategy.rs` implements the three signals named in SPEC_FULL §4.6.

pub mod strategy;

pub use strategy::{evaluate_all, StrategyInput, StrategyVerdict};
