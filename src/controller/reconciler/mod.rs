//! # Reconciler
//!
//! Core reconciliation logic for `WorkflowExecution` resources.
//!
//! The reconciler:
//! - Watches `WorkflowExecution` resources across all namespaces
//! - Guarantees at most one running execution per target
//! - Applies per-target exponential backoff after pre-execution failures
//! - Delegates the work to a Tekton `PipelineRun` and follows it to completion
//! - Classifies failures and records them in status
//! - Releases the execution resource after the cooldown period
//!
//! ## Reconciliation Flow
//!
//! 1. Add the cleanup finalizer
//! 2. Validate the spec
//! 3. Check the resource lock (running siblings, then the deterministic name)
//! 4. Check the cooldown inherited from the previous record for the target
//! 5. Create the `PipelineRun` and poll it
//! 6. Record the outcome, then clean up after the cooldown period

pub mod cooldown;
pub mod execution;
pub mod lifecycle;
pub mod lock;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

// Re-export public API
pub use lock::{execution_resource_name, target_hash};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError};
