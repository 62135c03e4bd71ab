//! # Custom Resource Definitions
//!
//! CRD types for the Workflow Execution Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `WorkflowExecution` specification
//! - `status.rs` - status, failure and skip types

mod spec;
mod status;

pub use spec::{ExecutionConfig, WorkflowExecution, WorkflowExecutionSpec, WorkflowRef};
pub use status::{
    Condition, FailureCategory, FailureDetails, FailureReason, Phase, SkipDetails, SkipReason,
    WorkflowExecutionStatus,
};

impl WorkflowExecution {
    /// Current phase; a record without status is Pending
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// `namespace/name` identity used in logs, labels and audit events
    #[must_use]
    pub fn record_id(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    /// True when the owning system asked for deletion
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Creation timestamp as a chrono value
    #[must_use]
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let value = serde_json::to_value(self.metadata.creation_timestamp.as_ref()?).ok()?;
        chrono::DateTime::parse_from_rfc3339(value.as_str()?)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc))
    }

    /// True when the owning system asked to discard inherited backoff counters
    #[must_use]
    pub fn has_backoff_reset(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(crate::constants::RESET_BACKOFF_ANNOTATION))
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// True when both records denote the same object
    #[must_use]
    pub fn is_same_record(&self, other: &WorkflowExecution) -> bool {
        self.metadata.namespace == other.metadata.namespace
            && self.metadata.name == other.metadata.name
    }
}
