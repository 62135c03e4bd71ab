//! # WorkflowExecution Status
//!
//! Status types for tracking execution state, failures and skips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a WorkflowExecution
///
/// `Pending → Running → Completed | Failed`; `Skipped` is reachable only from
/// `Pending`. A record without status is `Pending`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
            Phase::Skipped => "Skipped",
        }
    }

    /// Completed, Failed and Skipped never transition again
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Skipped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the WorkflowExecution resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionStatus {
    /// Current phase
    #[serde(default)]
    pub phase: Phase,
    /// Deterministic name of the PipelineRun once created
    #[serde(default)]
    pub execution_resource_name: Option<String>,
    /// When the PipelineRun started
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// When the record reached a terminal phase
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    /// Set when the phase is Failed
    #[serde(default)]
    pub failure_details: Option<FailureDetails>,
    /// Set when the phase is Skipped
    #[serde(default)]
    pub skip_details: Option<SkipDetails>,
    /// Consecutive pre-execution failures for the target, reset to 0 on Completed
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Earliest time a new attempt for the target may start
    #[serde(default)]
    pub next_allowed_execution: Option<DateTime<Utc>>,
    /// True once the PipelineRun has been removed after the cooldown
    #[serde(default)]
    pub lock_released: bool,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Why an execution failed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetails {
    /// Taxonomy code
    pub reason: FailureReason,
    /// Category of the reason
    pub category: FailureCategory,
    /// Provider-native or controller message
    pub message: String,
    /// Pipeline task that caused the failure, if the failure happened during execution
    #[serde(default)]
    pub failed_unit_name: Option<String>,
    /// Position of the failed task among the executed tasks (0-based)
    #[serde(default)]
    pub failed_unit_index: Option<u32>,
    /// Exit code of the failed step, when the engine reports one
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Human-readable summary for downstream consumers
    pub natural_language_summary: String,
    /// True when the pipeline had started running: cluster state may be
    /// partially mutated and retries are unsafe
    pub was_execution_failure: bool,
    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

/// Failure taxonomy owned by the controller
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum FailureReason {
    /// Malformed record spec or pipeline definition
    ConfigurationError,
    /// The engine or a step was not authorized
    PermissionDenied,
    /// The engine API stayed unavailable across all submission attempts
    ExternalDependencyUnavailable,
    /// A step exited with an error
    TaskFailed,
    /// A task or the pipeline timed out
    DeadlineExceeded,
    /// A step container was OOM killed
    #[serde(rename = "OOMKilled")]
    OomKilled,
    /// A step image could not be pulled
    ImagePullBackOff,
    /// Quota or node resources were insufficient
    ResourceExhausted,
    /// No classification possible
    Unknown,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ConfigurationError => "ConfigurationError",
            FailureReason::PermissionDenied => "PermissionDenied",
            FailureReason::ExternalDependencyUnavailable => "ExternalDependencyUnavailable",
            FailureReason::TaskFailed => "TaskFailed",
            FailureReason::DeadlineExceeded => "DeadlineExceeded",
            FailureReason::OomKilled => "OOMKilled",
            FailureReason::ImagePullBackOff => "ImagePullBackOff",
            FailureReason::ResourceExhausted => "ResourceExhausted",
            FailureReason::Unknown => "Unknown",
        }
    }

    /// Error category the reason belongs to
    #[must_use]
    pub fn category(&self) -> FailureCategory {
        match self {
            FailureReason::ConfigurationError => FailureCategory::Validation,
            FailureReason::PermissionDenied => FailureCategory::Permission,
            FailureReason::ExternalDependencyUnavailable => FailureCategory::ExternalDependency,
            FailureReason::TaskFailed
            | FailureReason::DeadlineExceeded
            | FailureReason::OomKilled
            | FailureReason::ImagePullBackOff
            | FailureReason::ResourceExhausted => FailureCategory::Execution,
            FailureReason::Unknown => FailureCategory::System,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive error categories
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum FailureCategory {
    Validation,
    Permission,
    ExternalDependency,
    Execution,
    System,
}

/// Why a record was skipped instead of executed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkipDetails {
    pub reason: SkipReason,
    pub message: String,
    /// Record or execution resource that caused the skip
    #[serde(default)]
    pub conflicting_execution: Option<String>,
    pub skipped_at: DateTime<Utc>,
}

/// Skip reasons
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum SkipReason {
    /// Another execution for the target is running
    ResourceBusy,
    /// The target is cooling down after a recent execution
    RecentlyRemediated,
    /// An execution resource for the target exists with no live owner
    AlreadyExists,
    /// Too many consecutive pre-execution failures for the target
    ExhaustedRetries,
    /// The last execution for the target failed mid-run
    PreviousExecutionFailed,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ResourceBusy => "ResourceBusy",
            SkipReason::RecentlyRemediated => "RecentlyRemediated",
            SkipReason::AlreadyExists => "AlreadyExists",
            SkipReason::ExhaustedRetries => "ExhaustedRetries",
            SkipReason::PreviousExecutionFailed => "PreviousExecutionFailed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_defaults_to_pending() {
        assert_eq!(WorkflowExecutionStatus::default().phase, Phase::Pending);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!Phase::Pending.is_terminal());
        assert!(!Phase::Running.is_terminal());
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Skipped.is_terminal());
    }

    #[test]
    fn test_failure_reason_categories() {
        assert_eq!(
            FailureReason::ConfigurationError.category(),
            FailureCategory::Validation
        );
        assert_eq!(
            FailureReason::PermissionDenied.category(),
            FailureCategory::Permission
        );
        assert_eq!(
            FailureReason::ExternalDependencyUnavailable.category(),
            FailureCategory::ExternalDependency
        );
        assert_eq!(FailureReason::OomKilled.category(), FailureCategory::Execution);
        assert_eq!(FailureReason::Unknown.category(), FailureCategory::System);
    }

    #[test]
    fn test_oom_killed_serializes_with_provider_spelling() {
        let json = serde_json::to_string(&FailureReason::OomKilled).unwrap();
        assert_eq!(json, "\"OOMKilled\"");
        assert_eq!(FailureReason::OomKilled.as_str(), "OOMKilled");
    }

    #[test]
    fn test_status_deserializes_from_camel_case() {
        let status: WorkflowExecutionStatus = serde_json::from_value(serde_json::json!({
            "phase": "Failed",
            "consecutiveFailures": 2,
            "nextAllowedExecution": "2030-01-01T00:00:00Z",
            "lockReleased": false
        }))
        .unwrap();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.consecutive_failures, 2);
        assert!(status.next_allowed_execution.is_some());
        assert!(status.failure_details.is_none());
    }
}
