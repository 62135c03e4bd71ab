//! # Validation
//!
//! Validates `WorkflowExecution` specs before any work starts.

mod duration;
mod kubernetes;
mod workflow;

pub use duration::parse_go_duration;
pub use kubernetes::{validate_dns_label, validate_kubernetes_name, validate_parameter_name};
pub use workflow::validate_workflow_execution;

use thiserror::Error;

/// A spec field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: &str, message: impl std::fmt::Display) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}
