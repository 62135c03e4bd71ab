//! # Execution
//!
//! Builds and submits the delegated execution resource and maps its state.

pub mod failure;

use crate::config::ControllerConfig;
use crate::constants::{
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, SOURCE_NAMESPACE_LABEL, TARGET_HASH_LABEL,
    WORKFLOW_EXECUTION_LABEL,
};
use crate::controller::reconciler::lock::{execution_resource_name, target_hash};
use crate::controller::reconciler::types::Reconciler;
use crate::crd::WorkflowExecution;
use crate::provider::{ConditionState, EngineError, ExecutionRequest, ExecutionSnapshot};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Observed state of an execution resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    StillRunning,
    Succeeded,
    Failed,
}

/// `Succeeded=True` is success, `Succeeded=False` is failure, anything else
/// (including no condition yet) is still running
#[must_use]
pub fn map_status(snapshot: &ExecutionSnapshot) -> ExecutionStatus {
    match snapshot.condition.as_ref().map(|c| c.state) {
        Some(ConditionState::True) => ExecutionStatus::Succeeded,
        Some(ConditionState::False) => ExecutionStatus::Failed,
        Some(ConditionState::Unknown) | None => ExecutionStatus::StillRunning,
    }
}

/// Labels linking an execution resource back to its record
#[must_use]
pub fn back_reference_labels(record: &WorkflowExecution) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            WORKFLOW_EXECUTION_LABEL.to_string(),
            record.metadata.name.clone().unwrap_or_default(),
        ),
        (
            SOURCE_NAMESPACE_LABEL.to_string(),
            record
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        ),
        (
            TARGET_HASH_LABEL.to_string(),
            target_hash(&record.spec.target_resource),
        ),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}

/// Execution request for a record, applying per-record overrides
#[must_use]
pub fn build_request(record: &WorkflowExecution, config: &ControllerConfig) -> ExecutionRequest {
    let overrides = record.spec.execution_config.clone().unwrap_or_default();
    ExecutionRequest {
        name: execution_resource_name(&record.spec.target_resource),
        namespace: config.execution_namespace.clone(),
        bundle: record.spec.workflow_ref.container_image.clone(),
        workflow_id: record.spec.workflow_ref.workflow_id.clone(),
        parameters: record.spec.parameters.clone(),
        service_account: overrides
            .service_account_name
            .unwrap_or_else(|| config.execution_service_account.clone()),
        timeout: overrides.timeout,
        labels: back_reference_labels(record),
    }
}

/// Create the execution resource for `record`
///
/// # Errors
///
/// Returns the engine error unchanged; "already exists" is left to the
/// caller's name-conflict handling.
pub async fn submit(
    ctx: &Reconciler,
    record: &WorkflowExecution,
) -> Result<ExecutionSnapshot, EngineError> {
    let request = build_request(record, &ctx.config);
    let start = Instant::now();
    let result = ctx.engine.create(&request).await;
    ctx.metrics
        .observe_submission_duration(start.elapsed().as_secs_f64());
    debug!(
        execution.name = request.name.as_str(),
        success = result.is_ok(),
        "Submitted execution resource"
    );
    result
}
