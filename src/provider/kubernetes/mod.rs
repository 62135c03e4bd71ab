//! # Kubernetes Providers
//!
//! Record store over the `WorkflowExecution` API and a Tekton execution engine
//! over `PipelineRun`/`TaskRun` dynamic objects.

mod records;
mod tekton;

pub use records::KubeRecordStore;
pub use tekton::{
    pipeline_run_api_resource, pipeline_run_manifest, snapshot_from_pipeline_run,
    unit_from_task_run, TektonEngine,
};

/// HTTP status of an API error, `None` for transport-level failures
fn api_status(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(api_err) => Some(api_err.code),
        _ => None,
    }
}
