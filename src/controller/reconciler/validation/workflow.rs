//! # WorkflowExecution Validation

use super::{
    parse_go_duration, validate_dns_label, validate_kubernetes_name, validate_parameter_name,
    ValidationError,
};
use crate::crd::WorkflowExecution;

/// Validate a target key: `namespace/kind/name` or `kind/name`
fn validate_target_resource(target: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = target.split('/').collect();
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new(
            "spec.targetResource",
            format!("'{target}' must be 'namespace/kind/name' or 'kind/name'"),
        ));
    }
    Ok(())
}

/// Validate everything the controller needs before it may start an execution
///
/// # Errors
///
/// Returns the first invalid field.
pub fn validate_workflow_execution(record: &WorkflowExecution) -> Result<(), ValidationError> {
    // The record name becomes a label value on the execution resource
    let name = record.metadata.name.as_deref().unwrap_or_default();
    validate_dns_label(name, "metadata.name")
        .map_err(|e| ValidationError::new("metadata.name", e))?;

    let spec = &record.spec;
    validate_target_resource(&spec.target_resource)?;

    if spec.workflow_ref.container_image.trim().is_empty() {
        return Err(ValidationError::new(
            "spec.workflowRef.containerImage",
            "cannot be empty",
        ));
    }
    validate_dns_label(&spec.workflow_ref.workflow_id, "spec.workflowRef.workflowId")
        .map_err(|e| ValidationError::new("spec.workflowRef.workflowId", e))?;

    for key in spec.parameters.keys() {
        validate_parameter_name(key).map_err(|e| ValidationError::new("spec.parameters", e))?;
    }

    if let Some(config) = &spec.execution_config {
        if let Some(sa) = &config.service_account_name {
            validate_kubernetes_name(sa, "spec.executionConfig.serviceAccountName")
                .map_err(|e| ValidationError::new("spec.executionConfig.serviceAccountName", e))?;
        }
        if let Some(timeout) = &config.timeout {
            parse_go_duration(timeout)
                .map_err(|e| ValidationError::new("spec.executionConfig.timeout", e))?;
        }
    }

    Ok(())
}
