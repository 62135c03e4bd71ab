//! # WorkflowExecution Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// WorkflowExecution Custom Resource Definition
///
/// One record per remediation attempt. The controller runs the referenced
/// workflow as a Tekton PipelineRun, allowing at most one running execution
/// per `targetResource` across the cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: remediation.octopilot.io/v1alpha1
/// kind: WorkflowExecution
/// metadata:
///   name: restart-app-1-x7k2p
///   namespace: remediation
/// spec:
///   targetResource: production/deployment/app-1
///   workflowRef:
///     containerImage: ghcr.io/octopilot/workflows/restart-deployment:v1.2.0
///     workflowId: restart-deployment
///   parameters:
///     NAMESPACE: production
///     DEPLOYMENT: app-1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "WorkflowExecution",
    group = "remediation.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::WorkflowExecutionStatus",
    shortname = "wfe",
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.targetResource"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Execution", "type":"string", "jsonPath":".status.executionResourceName"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionSpec {
    /// Resource being remediated, as `namespace/kind/name` or `kind/name`
    /// for cluster-scoped resources. Immutable after creation.
    pub target_resource: String,
    /// Workflow to run
    pub workflow_ref: WorkflowRef,
    /// Parameters passed to the pipeline as string params
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Per-record overrides of the controller's execution defaults
    #[serde(default)]
    pub execution_config: Option<ExecutionConfig>,
}

/// Pointer to a packaged workflow definition
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRef {
    /// OCI bundle containing the Tekton Pipeline
    pub container_image: String,
    /// Name of the Pipeline inside the bundle
    pub workflow_id: String,
}

/// Execution overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Service account the PipelineRun executes as
    #[serde(default)]
    pub service_account_name: Option<String>,
    /// Pipeline timeout as a Go duration string (e.g. "30m", "1h30m")
    #[serde(default)]
    pub timeout: Option<String>,
}
