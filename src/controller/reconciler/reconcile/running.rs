//! # Running
//!
//! Polls the execution resource until it reports an outcome.

use crate::controller::reconciler::cooldown::apply_success;
use crate::controller::reconciler::execution::{failure, map_status, ExecutionStatus};
use crate::controller::reconciler::lock::{execution_resource_name, is_owned_by};
use crate::controller::reconciler::status::transition;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Phase, WorkflowExecution};
use crate::provider::EngineError;
use chrono::Utc;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

pub(super) async fn handle(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<Action, ReconcilerError> {
    let record_id = record.record_id();
    let name = record
        .status
        .as_ref()
        .and_then(|s| s.execution_resource_name.clone())
        .unwrap_or_else(|| execution_resource_name(&record.spec.target_resource));
    let namespace = ctx.config.execution_namespace.as_str();

    let snapshot = match ctx.engine.get(namespace, &name).await {
        Ok(snapshot) => snapshot,
        Err(EngineError::Transient(message)) => {
            warn!(
                record.id = record_id.as_str(),
                execution.name = name.as_str(),
                "Could not read execution resource, polling again: {}",
                message
            );
            return Ok(Action::requeue(ctx.config.status_poll_interval()));
        }
        Err(e) => return Err(e.into()),
    };

    // A resource with our name but another owner is as good as gone for us
    let Some(snapshot) = snapshot.filter(|s| is_owned_by(&s.labels, record)) else {
        warn!(
            record.id = record_id.as_str(),
            execution.name = name.as_str(),
            "Execution resource disappeared while running"
        );
        let details = failure::missing_execution(&name, Utc::now());
        transition(ctx, record, &[Phase::Running], |status| {
            status.phase = Phase::Failed;
            status.completion_time = Some(details.failed_at);
            status.failure_details = Some(details.clone());
        })
        .await?;
        return Ok(Action::await_change());
    };

    match map_status(&snapshot) {
        ExecutionStatus::StillRunning => {
            debug!(execution.name = name.as_str(), "Execution still running");
            Ok(Action::requeue(ctx.config.status_poll_interval()))
        }
        ExecutionStatus::Succeeded => {
            let completed = snapshot.completion_time.unwrap_or_else(Utc::now);
            transition(ctx, record, &[Phase::Running], |status| {
                status.phase = Phase::Completed;
                status.completion_time = Some(completed);
                status.failure_details = None;
                apply_success(status);
            })
            .await?;
            info!(
                record.id = record_id.as_str(),
                execution.name = name.as_str(),
                "Workflow execution completed"
            );
            Ok(Action::requeue(ctx.config.cooldown_period()))
        }
        ExecutionStatus::Failed => {
            let units = ctx.engine.list_units(namespace, &name).await?;
            let details = failure::extract(&snapshot, &units, Utc::now());
            let completed = snapshot.completion_time.unwrap_or(details.failed_at);
            warn!(
                record.id = record_id.as_str(),
                execution.name = name.as_str(),
                reason = details.reason.as_str(),
                failed_unit = details.failed_unit_name.as_deref().unwrap_or("-"),
                "Workflow execution failed: {}",
                details.message
            );
            // Counters are carried over unchanged: execution failures are
            // blocked by taxonomy, not by the counter
            transition(ctx, record, &[Phase::Running], |status| {
                status.phase = Phase::Failed;
                status.completion_time = Some(completed);
                status.failure_details = Some(details.clone());
            })
            .await?;
            Ok(Action::requeue(ctx.config.cooldown_period()))
        }
    }
}
