//! # Failure Classification
//!
//! Turns engine state into [`FailureDetails`].
//!
//! For a failed execution the proximate cause is the sub-unit that failed
//! first. Its native reason and message are kept, mapped into
//! [`FailureReason`], and summarized in one sentence for downstream
//! consumers.

use crate::crd::{FailureDetails, FailureReason};
use crate::provider::{ExecutionSnapshot, UnitSnapshot};
use chrono::{DateTime, Utc};

const TIMEOUT_REASONS: &[&str] = &["TaskRunTimeout", "PipelineRunTimeout"];
const CONFIGURATION_REASONS: &[&str] = &[
    "TaskRunValidationFailed",
    "PipelineValidationFailed",
    "CouldntGetPipeline",
    "CouldntGetTask",
    "ParameterMissing",
    "ParameterTypeMismatch",
    "InvalidWorkspaceBindings",
];
const IMAGE_PULL_REASONS: &[&str] = &["TaskRunImagePullFailed", "ImagePullBackOff", "ErrImagePull"];

/// Map native reasons into the controller taxonomy
///
/// `fallback` is used when nothing more specific matches.
#[must_use]
pub fn classify_reason(
    reason: Option<&str>,
    message: Option<&str>,
    termination_reason: Option<&str>,
    fallback: FailureReason,
) -> FailureReason {
    let text = format!(
        "{} {} {}",
        reason.unwrap_or_default(),
        message.unwrap_or_default(),
        termination_reason.unwrap_or_default()
    )
    .to_lowercase();
    let reason = reason.unwrap_or_default();

    if termination_reason == Some("OOMKilled") || text.contains("oomkilled") {
        FailureReason::OomKilled
    } else if TIMEOUT_REASONS.contains(&reason)
        || text.contains("deadline exceeded")
        || text.contains("timed out")
    {
        FailureReason::DeadlineExceeded
    } else if IMAGE_PULL_REASONS.contains(&reason)
        || text.contains("imagepullbackoff")
        || text.contains("errimagepull")
    {
        FailureReason::ImagePullBackOff
    } else if text.contains("forbidden") || text.contains("unauthorized") {
        FailureReason::PermissionDenied
    } else if text.contains("exceeded quota") || text.contains("insufficient") {
        FailureReason::ResourceExhausted
    } else if CONFIGURATION_REASONS.contains(&reason) {
        FailureReason::ConfigurationError
    } else {
        fallback
    }
}

/// Position of `failed` among the units in start order
fn unit_index(units: &[UnitSnapshot], failed: &UnitSnapshot) -> Option<u32> {
    let mut ordered: Vec<&UnitSnapshot> = units.iter().collect();
    ordered.sort_by(|a, b| {
        (a.start_time.is_none(), a.start_time, &a.name)
            .cmp(&(b.start_time.is_none(), b.start_time, &b.name))
    });
    ordered
        .iter()
        .position(|u| u.name == failed.name)
        .and_then(|i| u32::try_from(i).ok())
}

fn summary(reason: FailureReason, unit: Option<&str>, execution: &str, message: &str) -> String {
    let subject = unit.map_or_else(
        || format!("Workflow execution {execution}"),
        |unit| format!("Step '{unit}' of workflow execution {execution}"),
    );
    format!(
        "{subject} failed ({reason}): {message}. The workflow had already started, so the target may be partially modified; it will not be retried automatically."
    )
}

/// Failure details for an execution that reported `Succeeded=False`
///
/// Picks the failed unit with the earliest completion time. Without one, the
/// run-level condition is used.
#[must_use]
pub fn extract(
    snapshot: &ExecutionSnapshot,
    units: &[UnitSnapshot],
    now: DateTime<Utc>,
) -> FailureDetails {
    let failed = units
        .iter()
        .filter(|u| u.has_failed())
        .min_by(|a, b| {
            (a.completion_time.is_none(), a.completion_time, &a.name)
                .cmp(&(b.completion_time.is_none(), b.completion_time, &b.name))
        });

    if let Some(unit) = failed {
        let condition = unit.condition.as_ref();
        let native_reason = condition.and_then(|c| c.reason.as_deref());
        let message = condition
            .and_then(|c| c.message.clone())
            .or_else(|| native_reason.map(str::to_string))
            .unwrap_or_else(|| "step failed".to_string());
        let reason = classify_reason(
            native_reason,
            Some(&message),
            unit.termination_reason.as_deref(),
            FailureReason::TaskFailed,
        );
        return FailureDetails {
            reason,
            category: reason.category(),
            natural_language_summary: summary(
                reason,
                Some(unit.display_name()),
                &snapshot.name,
                &message,
            ),
            message,
            failed_unit_name: Some(unit.display_name().to_string()),
            failed_unit_index: unit_index(units, unit),
            exit_code: unit.exit_code,
            was_execution_failure: true,
            failed_at: unit.completion_time.unwrap_or(now),
        };
    }

    let condition = snapshot.condition.as_ref();
    let (reason, message) = match condition {
        Some(c) => (
            classify_reason(
                c.reason.as_deref(),
                c.message.as_deref(),
                None,
                FailureReason::TaskFailed,
            ),
            c.message
                .clone()
                .or_else(|| c.reason.clone())
                .unwrap_or_else(|| "execution failed".to_string()),
        ),
        None => (
            FailureReason::Unknown,
            "execution failed without a reported cause".to_string(),
        ),
    };
    FailureDetails {
        reason,
        category: reason.category(),
        natural_language_summary: summary(reason, None, &snapshot.name, &message),
        message,
        failed_unit_name: None,
        failed_unit_index: None,
        exit_code: None,
        was_execution_failure: true,
        failed_at: snapshot.completion_time.unwrap_or(now),
    }
}

/// Failure details for a running record whose execution resource vanished
#[must_use]
pub fn missing_execution(execution: &str, now: DateTime<Utc>) -> FailureDetails {
    let reason = FailureReason::Unknown;
    let message = format!("execution resource {execution} no longer exists");
    FailureDetails {
        reason,
        category: reason.category(),
        natural_language_summary: summary(reason, None, execution, &message),
        message,
        failed_unit_name: None,
        failed_unit_index: None,
        exit_code: None,
        was_execution_failure: true,
        failed_at: now,
    }
}

/// Failure details for a failure before any work started
#[must_use]
pub fn pre_execution(reason: FailureReason, message: String, now: DateTime<Utc>) -> FailureDetails {
    FailureDetails {
        reason,
        category: reason.category(),
        natural_language_summary: format!(
            "The workflow could not be started ({reason}): {message}. No changes were made to the target."
        ),
        message,
        failed_unit_name: None,
        failed_unit_index: None,
        exit_code: None,
        was_execution_failure: false,
        failed_at: now,
    }
}
