//! # Terminal
//!
//! After the cooldown period, deletes the execution resource and marks the
//! lock released.

use crate::controller::reconciler::lifecycle::release_execution;
use crate::controller::reconciler::status::transition;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Phase, WorkflowExecution, WorkflowExecutionStatus};
use chrono::Utc;
use kube_runtime::controller::Action;
use tracing::{debug, info};

pub(super) async fn handle(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<Action, ReconcilerError> {
    let status = record.status.clone().unwrap_or_default();
    if status.lock_released {
        return Ok(Action::await_change());
    }

    let release = |status: &mut WorkflowExecutionStatus| status.lock_released = true;

    // Failed before an execution resource was created: nothing to hold
    let Some(name) = status.execution_resource_name.clone() else {
        transition(ctx, record, &[Phase::Completed, Phase::Failed], release).await?;
        return Ok(Action::await_change());
    };

    let now = Utc::now();
    if let Some(finished) = status.completion_time.or(status.start_time) {
        let cooldown = chrono::Duration::from_std(ctx.config.cooldown_period())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let release_at = finished + cooldown;
        if release_at > now {
            let remaining = (release_at - now)
                .to_std()
                .unwrap_or(ctx.config.cooldown_period());
            debug!(
                execution.name = name.as_str(),
                remaining_secs = remaining.as_secs(),
                "Cooldown period not over yet"
            );
            return Ok(Action::requeue(remaining));
        }
    }

    let deleted = release_execution(ctx, record, &name).await?;
    transition(ctx, record, &[Phase::Completed, Phase::Failed], release).await?;
    info!(
        record.id = record.record_id().as_str(),
        execution.name = name.as_str(),
        deleted,
        "Cooldown over, execution lock released"
    );
    Ok(Action::await_change())
}
