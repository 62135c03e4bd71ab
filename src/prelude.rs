//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use workflow_execution_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (`WorkflowExecution`, `Phase`, failure and skip details)
//! - Provider traits (`RecordStore`, `ExecutionEngine`) and their errors
//! - Reconciler types (`Reconciler`, `ReconcilerError`)
//! - `ControllerConfig`
//! - Observability types (`Metrics`, audit sinks)

// CRD types - most commonly used
pub use crate::crd::*;

// Provider traits - needed for implementing stores and engines
pub use crate::provider::{
    EngineError, ExecutionEngine, ExecutionRequest, ExecutionSnapshot, RecordStore, StoreError,
    UnitSnapshot,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    execution_resource_name, reconcile, target_hash, Reconciler, ReconcilerError,
};

pub use crate::config::ControllerConfig;

pub use crate::observability::{AuditEvent, AuditSink, MemoryAuditSink, Metrics, TracingAuditSink};
