//! # Providers
//!
//! Seams between the reconciler and the systems it talks to.
//!
//! - [`RecordStore`]: versioned `WorkflowExecution` records with optimistic
//!   concurrency and a list-by-target query
//! - [`ExecutionEngine`]: the delegated pipeline engine (create, observe,
//!   list sub-units, delete by name)
//!
//! Each seam has a Kubernetes implementation in [`kubernetes`] and an
//! in-memory implementation in [`memory`] used by tests and local runs.

pub mod kubernetes;
pub mod memory;

use crate::crd::{WorkflowExecution, WorkflowExecutionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned by a [`RecordStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),
    /// The write was based on a stale resource version
    #[error("conflicting update of record {0}")]
    Conflict(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Errors worth retrying on the next cycle without operator action
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

/// Errors returned by an [`ExecutionEngine`]
#[derive(Debug, Error)]
pub enum EngineError {
    /// An execution resource with the requested name already exists
    #[error("execution resource {0} already exists")]
    AlreadyExists(String),
    /// The controller is not authorized to act on execution resources
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The engine rejected the request as malformed
    #[error("invalid execution request: {0}")]
    Invalid(String),
    /// Throttling, server errors or transport failures
    #[error("execution engine unavailable: {0}")]
    Transient(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Versioned record storage
///
/// All writes are conditional on the `resourceVersion` carried by the record
/// passed in; a stale version yields [`StoreError::Conflict`].
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Fetch a record, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<WorkflowExecution>, StoreError>;

    /// All records, in any namespace, whose `spec.targetResource` equals `target`
    async fn list_by_target(&self, target: &str) -> Result<Vec<WorkflowExecution>, StoreError>;

    /// Replace the status subresource, returning the updated record
    async fn update_status(
        &self,
        record: &WorkflowExecution,
        status: &WorkflowExecutionStatus,
    ) -> Result<WorkflowExecution, StoreError>;

    /// Replace the finalizer list, returning the updated record
    async fn set_finalizers(
        &self,
        record: &WorkflowExecution,
        finalizers: Vec<String>,
    ) -> Result<WorkflowExecution, StoreError>;

    /// Merge labels into the record metadata, returning the updated record
    async fn add_labels(
        &self,
        record: &WorkflowExecution,
        labels: BTreeMap<String, String>,
    ) -> Result<WorkflowExecution, StoreError>;
}

/// Everything needed to create one execution resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Deterministic name derived from the target
    pub name: String,
    pub namespace: String,
    /// OCI bundle holding the pipeline definition
    pub bundle: String,
    /// Pipeline name inside the bundle
    pub workflow_id: String,
    pub parameters: BTreeMap<String, String>,
    pub service_account: String,
    /// Go duration string passed through to the engine
    pub timeout: Option<String>,
    /// Back-reference and bookkeeping labels
    pub labels: BTreeMap<String, String>,
}

/// Tri-state of an engine condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    True,
    False,
    Unknown,
}

impl ConditionState {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "True" => ConditionState::True,
            "False" => ConditionState::False,
            _ => ConditionState::Unknown,
        }
    }
}

/// The engine's completion condition (`Succeeded` for Tekton)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCondition {
    pub state: ConditionState,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Read-only view of an execution resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSnapshot {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Absent until the engine has started processing the resource
    pub condition: Option<CompletionCondition>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

/// Read-only view of one sub-unit (TaskRun) of an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    /// Sub-unit resource name
    pub name: String,
    /// Task name within the pipeline, when the engine reports it
    pub pipeline_task: Option<String>,
    pub condition: Option<CompletionCondition>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    /// Exit code of the first step that terminated with a non-zero code
    pub exit_code: Option<i32>,
    /// Container termination reason of that step (e.g. `OOMKilled`)
    pub termination_reason: Option<String>,
}

impl UnitSnapshot {
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.condition
            .as_ref()
            .is_some_and(|c| c.state == ConditionState::False)
    }

    /// Name used in failure reports: the pipeline task when known
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.pipeline_task.as_deref().unwrap_or(&self.name)
    }
}

/// Delegated pipeline engine
#[async_trait]
pub trait ExecutionEngine: Send + Sync + std::fmt::Debug {
    /// Create the execution resource; [`EngineError::AlreadyExists`] when the
    /// name is taken
    async fn create(&self, request: &ExecutionRequest) -> Result<ExecutionSnapshot, EngineError>;

    /// Fetch an execution resource, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<ExecutionSnapshot>, EngineError>;

    /// Sub-units belonging to an execution, in no particular order
    async fn list_units(
        &self,
        namespace: &str,
        execution_name: &str,
    ) -> Result<Vec<UnitSnapshot>, EngineError>;

    /// Delete an execution resource; `false` when it was already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_state_parsing() {
        assert_eq!(ConditionState::parse("True"), ConditionState::True);
        assert_eq!(ConditionState::parse("False"), ConditionState::False);
        assert_eq!(ConditionState::parse("Unknown"), ConditionState::Unknown);
        assert_eq!(ConditionState::parse(""), ConditionState::Unknown);
    }

    #[test]
    fn test_unit_display_name_prefers_pipeline_task() {
        let unit = UnitSnapshot {
            name: "wfe-abc-drain-node".to_string(),
            pipeline_task: Some("drain-node".to_string()),
            condition: None,
            start_time: None,
            completion_time: None,
            exit_code: None,
            termination_reason: None,
        };
        assert_eq!(unit.display_name(), "drain-node");
        assert!(!unit.has_failed());
    }

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::Conflict("a/b".into()).is_transient());
        assert!(StoreError::Unavailable("timeout".into()).is_transient());
        assert!(!StoreError::NotFound("a/b".into()).is_transient());
    }
}
