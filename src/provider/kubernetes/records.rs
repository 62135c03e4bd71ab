//! # Kubernetes Record Store
//!
//! [`RecordStore`] over `Api<WorkflowExecution>`.
//!
//! Every write is a JSON merge patch carrying `metadata.resourceVersion`, so
//! the API server rejects it with 409 when the record changed since it was
//! read.

use super::api_status;
use crate::constants::{FIELD_MANAGER, TARGET_HASH_LABEL};
use crate::controller::reconciler::target_hash;
use crate::crd::{WorkflowExecution, WorkflowExecutionStatus};
use crate::provider::{RecordStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Record store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl std::fmt::Debug for KubeRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRecordStore").finish_non_exhaustive()
    }
}

impl KubeRecordStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<WorkflowExecution> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        }
    }

    /// Namespace, name and resource version of a record about to be written
    fn write_target(record: &WorkflowExecution) -> Result<(&str, &str, &str), StoreError> {
        let id = record.record_id();
        let namespace = record
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("record {id} has no namespace")))?;
        let name = record
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("record {id} has no name")))?;
        let resource_version = record.metadata.resource_version.as_deref().ok_or_else(|| {
            StoreError::Other(anyhow::anyhow!("record {id} has no resourceVersion"))
        })?;
        Ok((namespace, name, resource_version))
    }
}

fn store_error(error: kube::Error, id: &str) -> StoreError {
    match api_status(&error) {
        Some(404) => StoreError::NotFound(id.to_string()),
        Some(409) => StoreError::Conflict(id.to_string()),
        Some(429 | 500..=599) | None => StoreError::Unavailable(error.to_string()),
        Some(_) => StoreError::Other(anyhow::Error::new(error).context(format!("record {id}"))),
    }
}

#[async_trait]
impl RecordStore for KubeRecordStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        self.namespaced(namespace)
            .get_opt(name)
            .await
            .map_err(|e| store_error(e, &format!("{namespace}/{name}")))
    }

    async fn list_by_target(&self, target: &str) -> Result<Vec<WorkflowExecution>, StoreError> {
        let selector = format!("{TARGET_HASH_LABEL}={}", target_hash(target));
        let api: Api<WorkflowExecution> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| store_error(e, &selector))?;

        // Hash prefixes can collide; the label only narrows the query.
        let records: Vec<WorkflowExecution> = list
            .items
            .into_iter()
            .filter(|r| r.spec.target_resource == target)
            .collect();
        debug!(
            target_resource = target,
            count = records.len(),
            "Listed records by target"
        );
        Ok(records)
    }

    async fn update_status(
        &self,
        record: &WorkflowExecution,
        status: &WorkflowExecutionStatus,
    ) -> Result<WorkflowExecution, StoreError> {
        let (namespace, name, resource_version) = Self::write_target(record)?;
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        self.namespaced(namespace)
            .patch_status(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(e, &record.record_id()))
    }

    async fn set_finalizers(
        &self,
        record: &WorkflowExecution,
        finalizers: Vec<String>,
    ) -> Result<WorkflowExecution, StoreError> {
        let (namespace, name, resource_version) = Self::write_target(record)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": resource_version,
                "finalizers": finalizers,
            }
        });
        self.namespaced(namespace)
            .patch(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(e, &record.record_id()))
    }

    async fn add_labels(
        &self,
        record: &WorkflowExecution,
        labels: BTreeMap<String, String>,
    ) -> Result<WorkflowExecution, StoreError> {
        let (namespace, name, resource_version) = Self::write_target(record)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": resource_version,
                "labels": labels,
            }
        });
        self.namespaced(namespace)
            .patch(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(e, &record.record_id()))
    }
}
