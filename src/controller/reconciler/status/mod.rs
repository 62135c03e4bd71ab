//! # Status Management
//!
//! Conditional status writes for `WorkflowExecution` records.

mod transition;

pub use transition::{ready_condition, transition, TransitionOutcome};
