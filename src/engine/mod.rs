//! Execution engine for steward
//!
//! The engine drives a run from the terminal:
//! 1. Probing - Read current state of every resource
//! 2. Validating - Report every problem before anything changes
//! 3. Diffing - Show what would change and ask to continue
//! 4. Applying - Converge resources one at a time

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, execute, probe};
