//! # Lifecycle
//!
//! Deletion of execution resources, restricted to the record that owns them.

use crate::controller::reconciler::lock::is_owned_by;
use crate::controller::reconciler::types::Reconciler;
use crate::crd::WorkflowExecution;
use crate::provider::EngineError;
use tracing::{debug, info};

/// Delete the execution resource `name` if its back-reference names `record`
///
/// Returns `true` when a resource was deleted. A missing resource, or one
/// that belongs to another record, is left alone.
///
/// # Errors
///
/// Returns the engine error when the resource cannot be read or deleted.
pub async fn release_execution(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    name: &str,
) -> Result<bool, EngineError> {
    let namespace = ctx.config.execution_namespace.as_str();
    let Some(existing) = ctx.engine.get(namespace, name).await? else {
        debug!(execution.name = name, "Execution resource already gone");
        return Ok(false);
    };

    if !is_owned_by(&existing.labels, record) {
        debug!(
            execution.name = name,
            record.id = record.record_id().as_str(),
            "Execution resource belongs to another record, leaving it"
        );
        return Ok(false);
    }

    let deleted = ctx.engine.delete(namespace, name).await?;
    if deleted {
        info!(execution.name = name, "Deleted execution resource");
    }
    Ok(deleted)
}
