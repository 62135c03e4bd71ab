//! # Status Transitions
//!
//! Every status write goes through [`transition`]:
//!
//! - the write is conditional on the record's `resourceVersion`
//! - a rejected write re-reads the record and re-applies the mutation, up to
//!   `conflict_retry_limit` times
//! - the mutation only applies while the record is in one of the expected
//!   phases, so a replayed delivery that lost the race becomes a no-op
//! - unchanged statuses are not written
//! - a phase change emits one audit event and the transition metrics

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Condition, Phase, WorkflowExecution, WorkflowExecutionStatus};
use crate::observability::AuditEvent;
use crate::provider::StoreError;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Result of a status transition
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The mutation was applied (or was already in place)
    Applied(WorkflowExecution),
    /// The record left the expected phases before the write; nothing changed
    Superseded(WorkflowExecution),
}

/// `Ready` condition mirroring the phase
///
/// Keeps the previous transition time while status and reason are unchanged.
#[must_use]
pub fn ready_condition(
    status: &WorkflowExecutionStatus,
    previous: Option<&Condition>,
) -> Condition {
    let (ready, reason, message) = match status.phase {
        Phase::Pending => ("Unknown", "Pending".to_string(), None),
        Phase::Running => (
            "Unknown",
            "ExecutionRunning".to_string(),
            status
                .execution_resource_name
                .as_ref()
                .map(|name| format!("Execution resource {name} is running")),
        ),
        Phase::Completed => ("True", "ExecutionSucceeded".to_string(), None),
        Phase::Failed => (
            "False",
            status
                .failure_details
                .as_ref()
                .map_or_else(|| "Failed".to_string(), |d| d.reason.to_string()),
            status.failure_details.as_ref().map(|d| d.message.clone()),
        ),
        Phase::Skipped => (
            "False",
            status
                .skip_details
                .as_ref()
                .map_or_else(|| "Skipped".to_string(), |d| d.reason.to_string()),
            status.skip_details.as_ref().map(|d| d.message.clone()),
        ),
    };

    let last_transition_time = previous
        .filter(|c| c.status == ready && c.reason.as_deref() == Some(reason.as_str()))
        .and_then(|c| c.last_transition_time.clone())
        .or_else(|| Some(Utc::now().to_rfc3339()));

    Condition {
        r#type: "Ready".to_string(),
        status: ready.to_string(),
        last_transition_time,
        reason: Some(reason),
        message,
    }
}

fn record_phase_change(ctx: &Reconciler, updated: &WorkflowExecution, previous: Phase) {
    let status = updated.status.clone().unwrap_or_default();
    let now = Utc::now();

    let entered_previous = match previous {
        Phase::Pending => updated.created_at(),
        Phase::Running => status.start_time,
        _ => None,
    };
    if let Some(since) = entered_previous {
        let secs = (now - since).to_std().map_or(0.0, |d| d.as_secs_f64());
        ctx.metrics.observe_phase_duration(previous.as_str(), secs);
    }
    ctx.metrics.increment_phase_transitions(status.phase.as_str());

    info!(
        record.id = updated.record_id().as_str(),
        from = previous.as_str(),
        to = status.phase.as_str(),
        "Phase transition"
    );
    ctx.audit.emit(AuditEvent::for_transition(updated, previous));
}

/// Apply `mutate` to the record's status and persist it
///
/// # Errors
///
/// Store errors other than conflicts are returned as is. Conflicts beyond the
/// retry limit become [`ReconcilerError::ConflictRetriesExhausted`].
pub async fn transition<F>(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    expected: &[Phase],
    mutate: F,
) -> Result<TransitionOutcome, ReconcilerError>
where
    F: Fn(&mut WorkflowExecutionStatus),
{
    let record_id = record.record_id();
    let mut current = record.clone();
    let mut conflicts = 0u32;

    loop {
        let previous_phase = current.phase();
        if !expected.contains(&previous_phase) {
            debug!(
                record.id = record_id.as_str(),
                phase = previous_phase.as_str(),
                "Record already moved on, skipping status write"
            );
            return Ok(TransitionOutcome::Superseded(current));
        }

        let before = current.status.clone().unwrap_or_default();
        let mut status = before.clone();
        mutate(&mut status);
        status.observed_generation = current.metadata.generation;
        let previous_ready = before.conditions.iter().find(|c| c.r#type == "Ready");
        status.conditions = vec![ready_condition(&status, previous_ready)];

        if current.status.is_some() && status == before {
            return Ok(TransitionOutcome::Applied(current));
        }

        match ctx.records.update_status(&current, &status).await {
            Ok(updated) => {
                if status.phase != previous_phase {
                    record_phase_change(ctx, &updated, previous_phase);
                }
                return Ok(TransitionOutcome::Applied(updated));
            }
            Err(StoreError::Conflict(_)) if conflicts < ctx.config.conflict_retry_limit => {
                conflicts += 1;
                debug!(
                    record.id = record_id.as_str(),
                    attempt = conflicts,
                    "Status write conflicted, re-reading record"
                );
                let namespace = current.metadata.namespace.clone().unwrap_or_default();
                let name = current.metadata.name.clone().unwrap_or_default();
                current = ctx
                    .records
                    .get(&namespace, &name)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(record_id.clone()))?;
            }
            Err(StoreError::Conflict(_)) => {
                warn!(
                    record.id = record_id.as_str(),
                    attempts = conflicts + 1,
                    "Giving up on status write after repeated conflicts"
                );
                return Err(ReconcilerError::ConflictRetriesExhausted(record_id));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
