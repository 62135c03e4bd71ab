//! # Tekton Engine
//!
//! [`ExecutionEngine`] over Tekton `PipelineRun` and `TaskRun` resources
//! (`tekton.dev/v1`), accessed as dynamic objects so no Tekton client crate is
//! needed.
//!
//! A PipelineRun resolves its pipeline through the bundles resolver:
//!
//! ```yaml
//! spec:
//!   pipelineRef:
//!     resolver: bundles
//!     params:
//!       - { name: bundle, value: <containerImage> }
//!       - { name: name, value: <workflowId> }
//!       - { name: kind, value: pipeline }
//! ```

use super::api_status;
use crate::constants::FIELD_MANAGER;
use crate::provider::{
    CompletionCondition, ConditionState, EngineError, ExecutionEngine, ExecutionRequest,
    ExecutionSnapshot, UnitSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams,
};
use kube::Client;
use serde_json::{json, Value};
use tracing::debug;

const TEKTON_GROUP: &str = "tekton.dev";
const TEKTON_VERSION: &str = "v1";
const SUCCEEDED_CONDITION: &str = "Succeeded";
const PIPELINE_RUN_LABEL: &str = "tekton.dev/pipelineRun";
const PIPELINE_TASK_LABEL: &str = "tekton.dev/pipelineTask";

/// API resource of `tekton.dev/v1` PipelineRuns
#[must_use]
pub fn pipeline_run_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TEKTON_GROUP, TEKTON_VERSION, "PipelineRun"),
        "pipelineruns",
    )
}

fn task_run_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TEKTON_GROUP, TEKTON_VERSION, "TaskRun"),
        "taskruns",
    )
}

/// Full PipelineRun manifest for a request
#[must_use]
pub fn pipeline_run_manifest(request: &ExecutionRequest) -> Value {
    let params: Vec<Value> = request
        .parameters
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let mut spec = json!({
        "pipelineRef": {
            "resolver": "bundles",
            "params": [
                { "name": "bundle", "value": request.bundle },
                { "name": "name", "value": request.workflow_id },
                { "name": "kind", "value": "pipeline" },
            ],
        },
        "params": params,
        "taskRunTemplate": {
            "serviceAccountName": request.service_account,
        },
    });
    if let (Some(timeout), Some(spec)) = (&request.timeout, spec.as_object_mut()) {
        spec.insert("timeouts".to_string(), json!({ "pipeline": timeout }));
    }

    json!({
        "apiVersion": format!("{TEKTON_GROUP}/{TEKTON_VERSION}"),
        "kind": "PipelineRun",
        "metadata": {
            "name": request.name,
            "namespace": request.namespace,
            "labels": request.labels,
        },
        "spec": spec,
    })
}

fn parse_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn succeeded_condition(status: Option<&Value>) -> Option<CompletionCondition> {
    status?
        .get("conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(SUCCEEDED_CONDITION))
        .map(|c| CompletionCondition {
            state: ConditionState::parse(c.get("status").and_then(Value::as_str).unwrap_or("")),
            reason: c.get("reason").and_then(Value::as_str).map(str::to_string),
            message: c.get("message").and_then(Value::as_str).map(str::to_string),
        })
}

/// Read-only view of a PipelineRun
#[must_use]
pub fn snapshot_from_pipeline_run(object: &DynamicObject) -> ExecutionSnapshot {
    let status = object.data.get("status");
    ExecutionSnapshot {
        name: object.metadata.name.clone().unwrap_or_default(),
        namespace: object.metadata.namespace.clone().unwrap_or_default(),
        labels: object.metadata.labels.clone().unwrap_or_default(),
        condition: succeeded_condition(status),
        start_time: parse_time(status.and_then(|s| s.get("startTime"))),
        completion_time: parse_time(status.and_then(|s| s.get("completionTime"))),
    }
}

/// Read-only view of a TaskRun
#[must_use]
pub fn unit_from_task_run(object: &DynamicObject) -> UnitSnapshot {
    let status = object.data.get("status");

    // First step that terminated with a non-zero exit code
    let failed_step = status
        .and_then(|s| s.get("steps"))
        .and_then(Value::as_array)
        .and_then(|steps| {
            steps.iter().find_map(|step| {
                let terminated = step.get("terminated")?;
                let exit_code = terminated.get("exitCode")?.as_i64()?;
                (exit_code != 0).then(|| {
                    (
                        i32::try_from(exit_code).unwrap_or(i32::MAX),
                        terminated
                            .get("reason")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    )
                })
            })
        });

    UnitSnapshot {
        name: object.metadata.name.clone().unwrap_or_default(),
        pipeline_task: object
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(PIPELINE_TASK_LABEL))
            .cloned(),
        condition: succeeded_condition(status),
        start_time: parse_time(status.and_then(|s| s.get("startTime"))),
        completion_time: parse_time(status.and_then(|s| s.get("completionTime"))),
        exit_code: failed_step.as_ref().map(|(code, _)| *code),
        termination_reason: failed_step.and_then(|(_, reason)| reason),
    }
}

fn engine_error(error: kube::Error, name: &str) -> EngineError {
    let message = error.to_string();
    match api_status(&error) {
        Some(409) => EngineError::AlreadyExists(name.to_string()),
        Some(401 | 403) => EngineError::Forbidden(message),
        Some(400 | 422) => EngineError::Invalid(message),
        Some(429 | 500..=599) | None => EngineError::Transient(message),
        Some(_) => EngineError::Other(anyhow::Error::new(error).context(format!(
            "execution resource {name}"
        ))),
    }
}

/// Execution engine backed by Tekton
#[derive(Clone)]
pub struct TektonEngine {
    client: Client,
    pipeline_runs: ApiResource,
    task_runs: ApiResource,
}

impl std::fmt::Debug for TektonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TektonEngine").finish_non_exhaustive()
    }
}

impl TektonEngine {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pipeline_runs: pipeline_run_api_resource(),
            task_runs: task_run_api_resource(),
        }
    }

    fn pipeline_run_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.pipeline_runs)
    }
}

#[async_trait]
impl ExecutionEngine for TektonEngine {
    async fn create(&self, request: &ExecutionRequest) -> Result<ExecutionSnapshot, EngineError> {
        let object: DynamicObject = serde_json::from_value(pipeline_run_manifest(request))
            .map_err(|e| EngineError::Other(anyhow::Error::new(e).context("PipelineRun manifest")))?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let created = self
            .pipeline_run_api(&request.namespace)
            .create(&params, &object)
            .await
            .map_err(|e| engine_error(e, &request.name))?;
        debug!(
            execution.name = request.name.as_str(),
            execution.namespace = request.namespace.as_str(),
            "Created PipelineRun"
        );
        Ok(snapshot_from_pipeline_run(&created))
    }

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExecutionSnapshot>, EngineError> {
        let object = self
            .pipeline_run_api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| engine_error(e, name))?;
        Ok(object.as_ref().map(snapshot_from_pipeline_run))
    }

    async fn list_units(
        &self,
        namespace: &str,
        execution_name: &str,
    ) -> Result<Vec<UnitSnapshot>, EngineError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.task_runs);
        let selector = format!("{PIPELINE_RUN_LABEL}={execution_name}");
        let list = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| engine_error(e, execution_name))?;
        Ok(list.items.iter().map(unit_from_task_run).collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, EngineError> {
        match self
            .pipeline_run_api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(engine_error(e, name)),
        }
    }
}
