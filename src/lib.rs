//! Workflow Execution Controller Library
//!
//! Reconciles `WorkflowExecution` resources into Tekton `PipelineRun`s while
//! guaranteeing at most one running execution per target resource.
//!
//! ## Quick Start
//!
//! ```rust
//! use workflow_execution_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
