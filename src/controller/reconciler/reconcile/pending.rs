//! # Pending
//!
//! Decides whether a new record may start, and starts it.

use crate::constants::TARGET_HASH_LABEL;
use crate::controller::reconciler::cooldown::{
    apply_pre_execution_failure, carry_over, evaluate_cooldown, inherited_counters,
    most_recent_terminal_sibling, unresolved_execution_failure, CooldownDecision,
    InheritedCounters,
};
use crate::controller::reconciler::execution::{self, failure};
use crate::controller::reconciler::lock::{
    check_running_siblings, execution_resource_name, resolve_name_conflict, target_hash,
    LockOutcome, NameConflict,
};
use crate::controller::reconciler::status::{transition, TransitionOutcome};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::validate_workflow_execution;
use crate::crd::{FailureReason, Phase, SkipDetails, WorkflowExecution};
use crate::provider::{EngineError, ExecutionSnapshot};
use chrono::Utc;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub(super) async fn handle(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<Action, ReconcilerError> {
    let record = ensure_target_label(ctx, record).await?;
    let now = Utc::now();

    let siblings = ctx
        .records
        .list_by_target(&record.spec.target_resource)
        .await?;
    let sibling = most_recent_terminal_sibling(&record, &siblings);
    let execution_failure = unresolved_execution_failure(&record, &siblings);
    let inherited = inherited_counters(&record, sibling);

    if let Err(e) = validate_workflow_execution(&record) {
        warn!(
            record.id = record.record_id().as_str(),
            field = e.field.as_str(),
            "Validation failed: {}",
            e.message
        );
        return fail_before_execution(
            ctx,
            &record,
            inherited,
            FailureReason::ConfigurationError,
            e.to_string(),
        )
        .await;
    }

    match check_running_siblings(&record, &siblings, now) {
        LockOutcome::Blocked(skip) => {
            ctx.metrics.increment_lock_checks("busy");
            return skip_record(ctx, &record, skip).await;
        }
        LockOutcome::Clear => ctx.metrics.increment_lock_checks("clear"),
    }

    if let CooldownDecision::Blocked(skip) =
        evaluate_cooldown(&record, sibling, execution_failure, inherited, &ctx.config, now)
    {
        return skip_record(ctx, &record, skip).await;
    }

    submit(ctx, &record, inherited).await
}

/// Stamp the target index label used by the store's list-by-target query
async fn ensure_target_label(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<WorkflowExecution, ReconcilerError> {
    let hash = target_hash(&record.spec.target_resource);
    let current = record
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(TARGET_HASH_LABEL));
    if current == Some(&hash) {
        return Ok(record.clone());
    }
    let labels = BTreeMap::from([(TARGET_HASH_LABEL.to_string(), hash)]);
    Ok(ctx.records.add_labels(record, labels).await?)
}

async fn submit(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    inherited: InheritedCounters,
) -> Result<Action, ReconcilerError> {
    let record_id = record.record_id();

    match execution::submit(ctx, record).await {
        Ok(snapshot) => {
            ctx.clear_submission_attempts(&record_id);
            start_running(ctx, record, inherited, &snapshot).await
        }
        Err(EngineError::AlreadyExists(_)) => {
            ctx.metrics.increment_lock_checks("name_conflict");
            let name = execution_resource_name(&record.spec.target_resource);
            match resolve_name_conflict(ctx, record, &name, Utc::now()).await? {
                NameConflict::Adopt(snapshot) => {
                    ctx.clear_submission_attempts(&record_id);
                    start_running(ctx, record, inherited, &snapshot).await
                }
                NameConflict::Blocked(skip) => skip_record(ctx, record, skip).await,
                NameConflict::Retry => {
                    Ok(Action::requeue(ctx.config.transient_error_requeue_duration()))
                }
            }
        }
        Err(EngineError::Forbidden(message)) => {
            ctx.clear_submission_attempts(&record_id);
            fail_before_execution(
                ctx,
                record,
                inherited,
                FailureReason::PermissionDenied,
                message,
            )
            .await
        }
        Err(EngineError::Invalid(message)) => {
            ctx.clear_submission_attempts(&record_id);
            fail_before_execution(
                ctx,
                record,
                inherited,
                FailureReason::ConfigurationError,
                message,
            )
            .await
        }
        Err(EngineError::Transient(message)) => {
            let (attempts, delay) = ctx.record_submission_attempt(&record_id);
            if attempts >= ctx.config.max_submission_attempts {
                ctx.clear_submission_attempts(&record_id);
                return fail_before_execution(
                    ctx,
                    record,
                    inherited,
                    FailureReason::ExternalDependencyUnavailable,
                    format!("execution engine unavailable after {attempts} attempts: {message}"),
                )
                .await;
            }
            warn!(
                record.id = record_id.as_str(),
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Execution engine unavailable, retrying submission: {}",
                message
            );
            Ok(Action::requeue(delay))
        }
        Err(e @ EngineError::Other(_)) => Err(e.into()),
    }
}

async fn start_running(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    inherited: InheritedCounters,
    snapshot: &ExecutionSnapshot,
) -> Result<Action, ReconcilerError> {
    let name = snapshot.name.clone();
    let started = snapshot.start_time.unwrap_or_else(Utc::now);

    let outcome = transition(ctx, record, &[Phase::Pending], |status| {
        status.phase = Phase::Running;
        status.execution_resource_name = Some(name.clone());
        status.start_time = Some(started);
        status.failure_details = None;
        status.skip_details = None;
        carry_over(status, inherited);
    })
    .await?;

    Ok(match outcome {
        TransitionOutcome::Applied(_) => {
            info!(
                record.id = record.record_id().as_str(),
                execution.name = snapshot.name.as_str(),
                "Workflow execution started"
            );
            Action::requeue(ctx.config.status_poll_interval())
        }
        TransitionOutcome::Superseded(_) => Action::await_change(),
    })
}

async fn skip_record(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    skip: SkipDetails,
) -> Result<Action, ReconcilerError> {
    let reason = skip.reason;
    info!(
        record.id = record.record_id().as_str(),
        reason = reason.as_str(),
        "Skipping workflow execution: {}",
        skip.message
    );

    let outcome = transition(ctx, record, &[Phase::Pending], |status| {
        status.phase = Phase::Skipped;
        status.completion_time = Some(skip.skipped_at);
        status.skip_details = Some(skip.clone());
    })
    .await?;

    if matches!(outcome, TransitionOutcome::Applied(_)) {
        ctx.metrics.increment_skips(reason.as_str());
    }
    Ok(Action::await_change())
}

/// Terminal failure before any work started; feeds the per-target backoff
async fn fail_before_execution(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    inherited: InheritedCounters,
    reason: FailureReason,
    message: String,
) -> Result<Action, ReconcilerError> {
    let now = Utc::now();
    let backoff = ctx.config.cooldown_backoff();
    let details = failure::pre_execution(reason, message, now);

    warn!(
        record.id = record.record_id().as_str(),
        reason = reason.as_str(),
        "Workflow execution failed before starting: {}",
        details.message
    );

    let outcome = transition(ctx, record, &[Phase::Pending], |status| {
        status.phase = Phase::Failed;
        status.completion_time = Some(now);
        status.failure_details = Some(details.clone());
        status.skip_details = None;
        apply_pre_execution_failure(status, inherited, &backoff, now);
    })
    .await?;

    if matches!(outcome, TransitionOutcome::Applied(_)) {
        ctx.metrics.increment_backoff_activations();
    }
    Ok(Action::await_change())
}
