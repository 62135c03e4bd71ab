//! # Cooldown
//!
//! Per-target backoff carried from one record to the next.
//!
//! Counters live in record status. A new record for a target inherits them
//! from the most recent terminal sibling, so the backoff survives controller
//! restarts and is identical on every replica.
//!
//! Evaluation order:
//!
//! 1. an execution failed mid-run and no later sibling completed:
//!    `PreviousExecutionFailed`
//! 2. too many pre-execution failures in a row: `ExhaustedRetries`
//! 3. cooldown still running: `RecentlyRemediated`

use crate::config::ControllerConfig;
use crate::controller::backoff::CooldownBackoff;
use crate::crd::{Phase, SkipDetails, SkipReason, WorkflowExecution, WorkflowExecutionStatus};
use chrono::{DateTime, Utc};

/// Backoff counters a new record starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InheritedCounters {
    pub consecutive_failures: u32,
    pub next_allowed_execution: Option<DateTime<Utc>>,
}

/// Result of a cooldown evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownDecision {
    Clear,
    Blocked(SkipDetails),
}

/// Latest Completed or Failed record for the same target, excluding `record`
///
/// Ordered by completion time, falling back to creation time. Skipped records
/// never executed and are ignored.
#[must_use]
pub fn most_recent_terminal_sibling<'a>(
    record: &WorkflowExecution,
    siblings: &'a [WorkflowExecution],
) -> Option<&'a WorkflowExecution> {
    siblings
        .iter()
        .filter(|s| !s.is_same_record(record))
        .filter(|s| matches!(s.phase(), Phase::Completed | Phase::Failed))
        .max_by_key(|s| finished_at(s))
}

/// Latest sibling whose execution failed after it started, unless a sibling
/// completed after it
///
/// Pre-execution failures and skips in between do not lift the block.
#[must_use]
pub fn unresolved_execution_failure<'a>(
    record: &WorkflowExecution,
    siblings: &'a [WorkflowExecution],
) -> Option<&'a WorkflowExecution> {
    let others = || siblings.iter().filter(|s| !s.is_same_record(record));
    let failed = others()
        .filter(|s| s.phase() == Phase::Failed)
        .filter(|s| {
            s.status
                .as_ref()
                .and_then(|st| st.failure_details.as_ref())
                .is_some_and(|d| d.was_execution_failure)
        })
        .max_by_key(|s| finished_at(s))?;
    let failed_at = finished_at(failed);
    let resolved = others()
        .filter(|s| s.phase() == Phase::Completed)
        .any(|s| finished_at(s) > failed_at);
    (!resolved).then_some(failed)
}

fn finished_at(record: &WorkflowExecution) -> Option<DateTime<Utc>> {
    record
        .status
        .as_ref()
        .and_then(|st| st.completion_time)
        .or_else(|| record.created_at())
}

/// Counters `record` starts from
///
/// The reset annotation discards them.
#[must_use]
pub fn inherited_counters(
    record: &WorkflowExecution,
    sibling: Option<&WorkflowExecution>,
) -> InheritedCounters {
    if record.has_backoff_reset() {
        return InheritedCounters::default();
    }
    sibling
        .and_then(|s| s.status.as_ref())
        .map(|status| InheritedCounters {
            consecutive_failures: status.consecutive_failures,
            next_allowed_execution: status.next_allowed_execution,
        })
        .unwrap_or_default()
}

/// Decide whether `record` may start now
///
/// `execution_failure` comes from [`unresolved_execution_failure`], `sibling`
/// from [`most_recent_terminal_sibling`].
#[must_use]
pub fn evaluate_cooldown(
    record: &WorkflowExecution,
    sibling: Option<&WorkflowExecution>,
    execution_failure: Option<&WorkflowExecution>,
    inherited: InheritedCounters,
    config: &ControllerConfig,
    now: DateTime<Utc>,
) -> CooldownDecision {
    let target = &record.spec.target_resource;
    let blocked = |reason: SkipReason, conflicting: Option<&WorkflowExecution>, message: String| {
        CooldownDecision::Blocked(SkipDetails {
            reason,
            message,
            conflicting_execution: conflicting.map(WorkflowExecution::record_id),
            skipped_at: now,
        })
    };

    if execution_failure.is_some() {
        return blocked(
            SkipReason::PreviousExecutionFailed,
            execution_failure,
            format!(
                "The previous workflow execution for {target} failed after it started; the target may be partially modified and needs operator review"
            ),
        );
    }

    if inherited.consecutive_failures >= config.max_consecutive_failures {
        return blocked(
            SkipReason::ExhaustedRetries,
            sibling,
            format!(
                "{} consecutive pre-execution failures for {target} (limit {})",
                inherited.consecutive_failures, config.max_consecutive_failures
            ),
        );
    }

    if let Some(next) = inherited.next_allowed_execution.filter(|next| *next > now) {
        return blocked(
            SkipReason::RecentlyRemediated,
            sibling,
            format!(
                "Target {target} is cooling down until {} after {} consecutive failure(s)",
                next.to_rfc3339(),
                inherited.consecutive_failures
            ),
        );
    }

    CooldownDecision::Clear
}

/// Counters after a failure that happened before any work started
pub fn apply_pre_execution_failure(
    status: &mut WorkflowExecutionStatus,
    inherited: InheritedCounters,
    backoff: &CooldownBackoff,
    now: DateTime<Utc>,
) {
    let failures = inherited.consecutive_failures.saturating_add(1);
    status.consecutive_failures = failures;
    status.next_allowed_execution = Some(backoff.next_allowed_execution(now, failures));
}

/// Counters after a successful execution
pub fn apply_success(status: &mut WorkflowExecutionStatus) {
    status.consecutive_failures = 0;
    status.next_allowed_execution = None;
}

/// Counters carried unchanged into a record that starts executing
pub fn carry_over(status: &mut WorkflowExecutionStatus, inherited: InheritedCounters) {
    status.consecutive_failures = inherited.consecutive_failures;
    status.next_allowed_execution = inherited.next_allowed_execution;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RESET_BACKOFF_ANNOTATION;
    use crate::crd::{
        FailureCategory, FailureDetails, FailureReason, WorkflowExecutionSpec, WorkflowRef,
    };
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn record(name: &str, status: Option<WorkflowExecutionStatus>) -> WorkflowExecution {
        let mut record = WorkflowExecution::new(
            name,
            WorkflowExecutionSpec {
                target_resource: "ns/deployment/app-1".to_string(),
                workflow_ref: WorkflowRef {
                    container_image: "img".to_string(),
                    workflow_id: "wf".to_string(),
                },
                parameters: BTreeMap::new(),
                execution_config: None,
            },
        );
        record.metadata.namespace = Some("remediation".to_string());
        record.status = status;
        record
    }

    fn failed(name: &str, completed: DateTime<Utc>, execution_failure: bool, failures: u32) -> WorkflowExecution {
        record(
            name,
            Some(WorkflowExecutionStatus {
                phase: Phase::Failed,
                completion_time: Some(completed),
                consecutive_failures: failures,
                failure_details: Some(FailureDetails {
                    reason: FailureReason::TaskFailed,
                    category: FailureCategory::Execution,
                    message: "boom".to_string(),
                    failed_unit_name: None,
                    failed_unit_index: None,
                    exit_code: None,
                    natural_language_summary: String::new(),
                    was_execution_failure: execution_failure,
                    failed_at: completed,
                }),
                ..WorkflowExecutionStatus::default()
            }),
        )
    }

    #[test]
    fn test_most_recent_sibling_ignores_skipped_and_self() {
        let now = Utc::now();
        let me = record("me", None);
        let skipped = record(
            "skipped",
            Some(WorkflowExecutionStatus {
                phase: Phase::Skipped,
                completion_time: Some(now),
                ..WorkflowExecutionStatus::default()
            }),
        );
        let older = failed("older", now - chrono::Duration::minutes(10), false, 1);
        let newer = failed("newer", now - chrono::Duration::minutes(1), false, 2);
        let siblings = vec![me.clone(), skipped, older, newer];

        let latest = most_recent_terminal_sibling(&me, &siblings).unwrap();
        assert_eq!(latest.metadata.name.as_deref(), Some("newer"));
    }

    #[test]
    fn test_execution_failure_blocks_absolutely() {
        let now = Utc::now();
        let sibling = failed("prev", now, true, 0);
        let me = record("me", None);
        let siblings = vec![sibling.clone()];
        let inherited = inherited_counters(&me, Some(&sibling));
        let decision = evaluate_cooldown(
            &me,
            Some(&sibling),
            unresolved_execution_failure(&me, &siblings),
            inherited,
            &ControllerConfig::default(),
            now,
        );
        match decision {
            CooldownDecision::Blocked(skip) => {
                assert_eq!(skip.reason, SkipReason::PreviousExecutionFailed);
                assert_eq!(skip.conflicting_execution.as_deref(), Some("remediation/prev"));
            }
            CooldownDecision::Clear => panic!("expected PreviousExecutionFailed"),
        }
    }

    #[test]
    fn test_later_pre_execution_failure_keeps_execution_failure_unresolved() {
        let now = Utc::now();
        let me = record("me", None);
        let execution = failed("execution", now - chrono::Duration::minutes(10), true, 0);
        let invalid = failed("invalid", now - chrono::Duration::minutes(1), false, 1);
        let siblings = vec![execution, invalid];

        assert_eq!(
            most_recent_terminal_sibling(&me, &siblings).and_then(|s| s.metadata.name.as_deref()),
            Some("invalid")
        );
        let unresolved = unresolved_execution_failure(&me, &siblings).unwrap();
        assert_eq!(unresolved.metadata.name.as_deref(), Some("execution"));
    }

    #[test]
    fn test_later_completion_resolves_execution_failure() {
        let now = Utc::now();
        let me = record("me", None);
        let execution = failed("execution", now - chrono::Duration::minutes(10), true, 0);
        let completed = record(
            "completed",
            Some(WorkflowExecutionStatus {
                phase: Phase::Completed,
                completion_time: Some(now - chrono::Duration::minutes(5)),
                ..WorkflowExecutionStatus::default()
            }),
        );
        let older_completed = record(
            "older-completed",
            Some(WorkflowExecutionStatus {
                phase: Phase::Completed,
                completion_time: Some(now - chrono::Duration::minutes(20)),
                ..WorkflowExecutionStatus::default()
            }),
        );

        let siblings = vec![older_completed.clone(), execution.clone()];
        assert!(unresolved_execution_failure(&me, &siblings).is_some());

        let siblings = vec![older_completed, execution, completed];
        assert!(unresolved_execution_failure(&me, &siblings).is_none());
    }

    #[test]
    fn test_execution_failure_outranks_reset_annotation() {
        let now = Utc::now();
        let sibling = failed("prev", now, true, 0);
        let mut me = record("me", None);
        me.metadata.annotations = Some(BTreeMap::from([(
            RESET_BACKOFF_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
        let inherited = inherited_counters(&me, Some(&sibling));
        assert!(matches!(
            evaluate_cooldown(
                &me,
                Some(&sibling),
                Some(&sibling),
                inherited,
                &ControllerConfig::default(),
                now
            ),
            CooldownDecision::Blocked(SkipDetails {
                reason: SkipReason::PreviousExecutionFailed,
                ..
            })
        ));
    }

    #[test]
    fn test_exhausted_retries_before_cooldown() {
        let now = Utc::now();
        let inherited = InheritedCounters {
            consecutive_failures: 5,
            next_allowed_execution: Some(now + chrono::Duration::minutes(10)),
        };
        let me = record("me", None);
        match evaluate_cooldown(&me, None, None, inherited, &ControllerConfig::default(), now) {
            CooldownDecision::Blocked(skip) => assert_eq!(skip.reason, SkipReason::ExhaustedRetries),
            CooldownDecision::Clear => panic!("expected ExhaustedRetries"),
        }
    }

    #[test]
    fn test_future_next_allowed_is_recently_remediated() {
        let now = Utc::now();
        let inherited = InheritedCounters {
            consecutive_failures: 2,
            next_allowed_execution: Some(now + chrono::Duration::seconds(30)),
        };
        let me = record("me", None);
        match evaluate_cooldown(&me, None, None, inherited, &ControllerConfig::default(), now) {
            CooldownDecision::Blocked(skip) => {
                assert_eq!(skip.reason, SkipReason::RecentlyRemediated);
            }
            CooldownDecision::Clear => panic!("expected RecentlyRemediated"),
        }
    }

    #[test]
    fn test_elapsed_cooldown_is_clear() {
        let now = Utc::now();
        let inherited = InheritedCounters {
            consecutive_failures: 2,
            next_allowed_execution: Some(now - chrono::Duration::seconds(1)),
        };
        let me = record("me", None);
        assert_eq!(
            evaluate_cooldown(&me, None, None, inherited, &ControllerConfig::default(), now),
            CooldownDecision::Clear
        );
    }

    #[test]
    fn test_reset_annotation_discards_counters() {
        let now = Utc::now();
        let sibling = failed("prev", now, false, 5);
        let mut me = record("me", None);
        me.metadata.annotations = Some(BTreeMap::from([(
            RESET_BACKOFF_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
        assert_eq!(
            inherited_counters(&me, Some(&sibling)),
            InheritedCounters::default()
        );
    }

    #[test]
    fn test_pre_execution_failure_increments_and_schedules() {
        let now = Utc::now();
        let backoff = CooldownBackoff::new(Duration::from_secs(60), Duration::from_secs(600), 4);
        let mut status = WorkflowExecutionStatus::default();
        apply_pre_execution_failure(
            &mut status,
            InheritedCounters {
                consecutive_failures: 2,
                next_allowed_execution: None,
            },
            &backoff,
            now,
        );
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(
            status.next_allowed_execution.map(|t| (t - now).num_seconds()),
            Some(240)
        );
    }

    #[test]
    fn test_success_resets_counters() {
        let mut status = WorkflowExecutionStatus {
            consecutive_failures: 4,
            next_allowed_execution: Some(Utc::now()),
            ..WorkflowExecutionStatus::default()
        };
        apply_success(&mut status);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.next_allowed_execution.is_none());
    }
}
