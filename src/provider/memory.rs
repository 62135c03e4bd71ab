//! # In-Memory Providers
//!
//! [`RecordStore`] and [`ExecutionEngine`] implementations that keep all state
//! in process. They follow the same contracts as the Kubernetes providers:
//! resource versions on every write, label-indexed target queries, finalizers
//! that hold back deletion, and atomic create-by-name.
//!
//! Used by the integration tests and for running the reconciler without a
//! cluster.

use crate::constants::TARGET_HASH_LABEL;
use crate::controller::reconciler::target_hash;
use crate::crd::{WorkflowExecution, WorkflowExecutionStatus};
use crate::provider::{
    CompletionCondition, ConditionState, EngineError, ExecutionEngine, ExecutionRequest,
    ExecutionSnapshot, RecordStore, StoreError, UnitSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kubernetes `Time` from a chrono timestamp
fn kube_time(
    at: DateTime<Utc>,
) -> Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time> {
    serde_json::from_value(serde_json::Value::String(at.to_rfc3339())).ok()
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<Key, WorkflowExecution>,
    next_version: u64,
    pending_conflicts: u32,
    write_count: u64,
}

impl StoreState {
    fn bump(&mut self, record: &mut WorkflowExecution) {
        self.next_version += 1;
        self.write_count += 1;
        record.metadata.resource_version = Some(self.next_version.to_string());
    }

    /// Stored copy of `record`, checked against its resource version
    fn current_mut(
        &mut self,
        record: &WorkflowExecution,
    ) -> Result<&mut WorkflowExecution, StoreError> {
        let id = record.record_id();
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::Conflict(id));
        }
        let k = key(
            record.metadata.namespace.as_deref().unwrap_or("default"),
            record.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored = self
            .records
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if stored.metadata.resource_version != record.metadata.resource_version {
            return Err(StoreError::Conflict(id));
        }
        Ok(stored)
    }
}

/// In-process record store
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record, assigning uid, resource version, generation and
    /// creation timestamp the way the API server does
    pub fn insert(&self, mut record: WorkflowExecution) -> WorkflowExecution {
        let mut state = lock(&self.state);
        if record.metadata.namespace.is_none() {
            record.metadata.namespace = Some("default".to_string());
        }
        record.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        record.metadata.generation = Some(1);
        if record.metadata.creation_timestamp.is_none() {
            record.metadata.creation_timestamp = kube_time(Utc::now());
        }
        state.bump(&mut record);
        let k = key(
            record.metadata.namespace.as_deref().unwrap_or("default"),
            record.metadata.name.as_deref().unwrap_or_default(),
        );
        state.records.insert(k, record.clone());
        record
    }

    /// Request deletion: records holding finalizers get a deletion timestamp,
    /// others are removed immediately
    pub fn delete(&self, namespace: &str, name: &str) -> Option<WorkflowExecution> {
        let mut state = lock(&self.state);
        let k = key(namespace, name);
        let mut record = state.records.get(&k)?.clone();
        if record.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            if record.metadata.deletion_timestamp.is_none() {
                record.metadata.deletion_timestamp = kube_time(Utc::now());
                state.bump(&mut record);
                state.records.insert(k, record.clone());
            }
            Some(record)
        } else {
            state.records.remove(&k);
            None
        }
    }

    /// Make the next `count` writes fail with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        lock(&self.state).pending_conflicts = count;
    }

    /// Every record currently stored
    #[must_use]
    pub fn records(&self) -> Vec<WorkflowExecution> {
        lock(&self.state).records.values().cloned().collect()
    }

    /// Number of successful writes since creation
    #[must_use]
    pub fn write_count(&self) -> u64 {
        lock(&self.state).write_count
    }

    /// Synchronous lookup for assertions
    #[must_use]
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<WorkflowExecution> {
        lock(&self.state).records.get(&key(namespace, name)).cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.snapshot(namespace, name))
    }

    async fn list_by_target(&self, target: &str) -> Result<Vec<WorkflowExecution>, StoreError> {
        let hash = target_hash(target);
        Ok(lock(&self.state)
            .records
            .values()
            .filter(|r| {
                r.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(TARGET_HASH_LABEL))
                    .is_some_and(|v| *v == hash)
            })
            .filter(|r| r.spec.target_resource == target)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        record: &WorkflowExecution,
        status: &WorkflowExecutionStatus,
    ) -> Result<WorkflowExecution, StoreError> {
        let mut state = lock(&self.state);
        let mut updated = state.current_mut(record)?.clone();
        updated.status = Some(status.clone());
        state.bump(&mut updated);
        let k = key(
            updated.metadata.namespace.as_deref().unwrap_or("default"),
            updated.metadata.name.as_deref().unwrap_or_default(),
        );
        state.records.insert(k, updated.clone());
        Ok(updated)
    }

    async fn set_finalizers(
        &self,
        record: &WorkflowExecution,
        finalizers: Vec<String>,
    ) -> Result<WorkflowExecution, StoreError> {
        let mut state = lock(&self.state);
        let mut updated = state.current_mut(record)?.clone();
        updated.metadata.finalizers = Some(finalizers);
        state.bump(&mut updated);
        let k = key(
            updated.metadata.namespace.as_deref().unwrap_or("default"),
            updated.metadata.name.as_deref().unwrap_or_default(),
        );
        let released = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().is_some_and(Vec::is_empty);
        if released {
            state.records.remove(&k);
        } else {
            state.records.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn add_labels(
        &self,
        record: &WorkflowExecution,
        labels: BTreeMap<String, String>,
    ) -> Result<WorkflowExecution, StoreError> {
        let mut state = lock(&self.state);
        let mut updated = state.current_mut(record)?.clone();
        updated
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
        state.bump(&mut updated);
        let k = key(
            updated.metadata.namespace.as_deref().unwrap_or("default"),
            updated.metadata.name.as_deref().unwrap_or_default(),
        );
        state.records.insert(k, updated.clone());
        Ok(updated)
    }
}

#[derive(Debug, Default)]
struct EngineState {
    executions: BTreeMap<Key, ExecutionSnapshot>,
    units: BTreeMap<Key, Vec<UnitSnapshot>>,
    requests: Vec<ExecutionRequest>,
    create_errors: VecDeque<EngineError>,
    delete_errors: VecDeque<EngineError>,
    deleted: Vec<Key>,
}

/// In-process execution engine
///
/// Creates are atomic per name. Executions start without a completion
/// condition; tests drive them with [`succeed`](Self::succeed) and
/// [`fail`](Self::fail).
#[derive(Debug, Default)]
pub struct InMemoryExecutionEngine {
    state: Mutex<EngineState>,
}

impl InMemoryExecutionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next create call
    pub fn inject_create_error(&self, error: EngineError) {
        lock(&self.state).create_errors.push_back(error);
    }

    /// Queue an error for the next delete call
    pub fn inject_delete_error(&self, error: EngineError) {
        lock(&self.state).delete_errors.push_back(error);
    }

    /// Place an execution resource directly, bypassing create
    pub fn put(&self, snapshot: ExecutionSnapshot) {
        let k = key(&snapshot.namespace, &snapshot.name);
        lock(&self.state).executions.insert(k, snapshot);
    }

    /// Remove an execution resource without recording a delete
    pub fn remove(&self, namespace: &str, name: &str) {
        lock(&self.state).executions.remove(&key(namespace, name));
    }

    fn set_condition(&self, namespace: &str, name: &str, condition: CompletionCondition) {
        let mut state = lock(&self.state);
        if let Some(execution) = state.executions.get_mut(&key(namespace, name)) {
            if condition.state != ConditionState::Unknown {
                execution.completion_time = Some(Utc::now());
            }
            execution.condition = Some(condition);
        }
    }

    /// Mark an execution as running
    pub fn start(&self, namespace: &str, name: &str) {
        self.set_condition(
            namespace,
            name,
            CompletionCondition {
                state: ConditionState::Unknown,
                reason: Some("Running".to_string()),
                message: Some("Tasks Completed: 0 (Failed: 0), Incomplete: 1".to_string()),
            },
        );
    }

    /// Mark an execution as succeeded
    pub fn succeed(&self, namespace: &str, name: &str) {
        self.set_condition(
            namespace,
            name,
            CompletionCondition {
                state: ConditionState::True,
                reason: Some("Succeeded".to_string()),
                message: Some("All Tasks have completed executing".to_string()),
            },
        );
    }

    /// Mark an execution as failed with a run-level reason and message
    pub fn fail(&self, namespace: &str, name: &str, reason: &str, message: &str) {
        self.set_condition(
            namespace,
            name,
            CompletionCondition {
                state: ConditionState::False,
                reason: Some(reason.to_string()),
                message: Some(message.to_string()),
            },
        );
    }

    /// Attach a sub-unit to an execution
    pub fn add_unit(&self, namespace: &str, execution_name: &str, unit: UnitSnapshot) {
        lock(&self.state)
            .units
            .entry(key(namespace, execution_name))
            .or_default()
            .push(unit);
    }

    #[must_use]
    pub fn exists(&self, namespace: &str, name: &str) -> bool {
        lock(&self.state)
            .executions
            .contains_key(&key(namespace, name))
    }

    #[must_use]
    pub fn execution(&self, namespace: &str, name: &str) -> Option<ExecutionSnapshot> {
        lock(&self.state)
            .executions
            .get(&key(namespace, name))
            .cloned()
    }

    /// Every successful create request, in order
    #[must_use]
    pub fn requests(&self) -> Vec<ExecutionRequest> {
        lock(&self.state).requests.clone()
    }

    /// Names of executions removed through [`ExecutionEngine::delete`]
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state)
            .deleted
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryExecutionEngine {
    async fn create(&self, request: &ExecutionRequest) -> Result<ExecutionSnapshot, EngineError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.create_errors.pop_front() {
            return Err(error);
        }
        let k = key(&request.namespace, &request.name);
        if state.executions.contains_key(&k) {
            return Err(EngineError::AlreadyExists(request.name.clone()));
        }
        let snapshot = ExecutionSnapshot {
            name: request.name.clone(),
            namespace: request.namespace.clone(),
            labels: request.labels.clone(),
            condition: None,
            start_time: Some(Utc::now()),
            completion_time: None,
        };
        state.executions.insert(k, snapshot.clone());
        state.requests.push(request.clone());
        Ok(snapshot)
    }

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExecutionSnapshot>, EngineError> {
        Ok(self.execution(namespace, name))
    }

    async fn list_units(
        &self,
        namespace: &str,
        execution_name: &str,
    ) -> Result<Vec<UnitSnapshot>, EngineError> {
        Ok(lock(&self.state)
            .units
            .get(&key(namespace, execution_name))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, EngineError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.delete_errors.pop_front() {
            return Err(error);
        }
        let k = key(namespace, name);
        let existed = state.executions.remove(&k).is_some();
        state.units.remove(&k);
        if existed {
            state.deleted.push(k);
        }
        Ok(existed)
    }
}
