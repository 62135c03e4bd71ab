//! # Finalization
//!
//! The cleanup finalizer keeps a record around until its execution resource
//! has been deleted.

use crate::constants::CLEANUP_FINALIZER;
use crate::controller::reconciler::lifecycle::release_execution;
use crate::controller::reconciler::lock::execution_resource_name;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::WorkflowExecution;
use crate::provider::{EngineError, StoreError};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

fn has_cleanup_finalizer(record: &WorkflowExecution) -> bool {
    record
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == CLEANUP_FINALIZER))
}

/// Add the cleanup finalizer if missing, returning the current record
///
/// # Errors
///
/// Returns the store error when the finalizer could not be written.
pub async fn ensure_finalizer(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<WorkflowExecution, ReconcilerError> {
    if has_cleanup_finalizer(record) {
        return Ok(record.clone());
    }

    let mut finalizers = record.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(CLEANUP_FINALIZER.to_string());
    let updated = ctx.records.set_finalizers(record, finalizers).await?;
    debug!(record.id = record.record_id().as_str(), "Added cleanup finalizer");
    Ok(updated)
}

/// Delete the execution resource (best effort) and release the finalizer
///
/// Works for every phase; a running execution is cancelled by deleting it.
///
/// # Errors
///
/// Transient engine errors are returned so the deletion is retried; other
/// engine errors are logged and the finalizer is released anyway.
pub async fn handle_deletion(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<Action, ReconcilerError> {
    let record_id = record.record_id();
    if !has_cleanup_finalizer(record) {
        return Ok(Action::await_change());
    }

    let name = record
        .status
        .as_ref()
        .and_then(|s| s.execution_resource_name.clone())
        .unwrap_or_else(|| execution_resource_name(&record.spec.target_resource));

    match release_execution(ctx, record, &name).await {
        Ok(deleted) => {
            debug!(
                record.id = record_id.as_str(),
                execution.name = name.as_str(),
                deleted,
                "Execution resource cleanup finished"
            );
        }
        Err(e @ EngineError::Transient(_)) => return Err(e.into()),
        Err(e) => {
            warn!(
                record.id = record_id.as_str(),
                execution.name = name.as_str(),
                error = %e,
                "Failed to delete execution resource, releasing finalizer anyway"
            );
        }
    }

    let remaining: Vec<String> = record
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != CLEANUP_FINALIZER)
        .collect();
    match ctx.records.set_finalizers(record, remaining).await {
        Ok(_) | Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    ctx.clear_submission_attempts(&record_id);
    info!(record.id = record_id.as_str(), "Finalized workflow execution");
    Ok(Action::await_change())
}
