//! Common test utilities for reconciliation tests
//!
//! Wires a [`Reconciler`] to the in-memory record store and execution engine
//! so the full reconcile loop runs without a cluster.

#![allow(dead_code, reason = "each test crate uses a different subset of helpers")]

use chrono::{DateTime, Utc};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use workflow_execution_controller::prelude::*;
use workflow_execution_controller::provider::memory::{
    InMemoryExecutionEngine, InMemoryRecordStore,
};
use workflow_execution_controller::provider::{CompletionCondition, ConditionState};

pub const RECORD_NAMESPACE: &str = "remediation";
pub const TARGET: &str = "ns/deployment/app-1";

/// Reconciler plus handles on every in-memory backend
pub struct Harness {
    pub store: Arc<InMemoryRecordStore>,
    pub engine: Arc<InMemoryExecutionEngine>,
    pub audit: Arc<MemoryAuditSink>,
    pub metrics: Arc<Metrics>,
    pub ctx: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let engine = Arc::new(InMemoryExecutionEngine::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let metrics = Arc::new(Metrics::unregistered().expect("metrics"));
        let ctx = Arc::new(Reconciler::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&engine) as Arc<dyn ExecutionEngine>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&metrics),
            Arc::new(config),
        ));
        Self {
            store,
            engine,
            audit,
            metrics,
            ctx,
        }
    }

    /// Store a new record for `target`
    pub fn create(&self, name: &str, target: &str) -> WorkflowExecution {
        self.store.insert(record(name, target))
    }

    /// Current stored copy of a record
    pub fn get(&self, name: &str) -> WorkflowExecution {
        self.store
            .snapshot(RECORD_NAMESPACE, name)
            .unwrap_or_else(|| panic!("record {name} not found"))
    }

    pub fn phase(&self, name: &str) -> Phase {
        self.get(name).phase()
    }

    pub fn status(&self, name: &str) -> WorkflowExecutionStatus {
        self.get(name).status.unwrap_or_default()
    }

    /// Reconcile the stored copy of a record once
    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcilerError> {
        let record = self.get(name);
        reconcile(Arc::new(record), Arc::clone(&self.ctx)).await
    }

    /// Reconcile until the handler waits for a change, or `passes` runs out
    pub async fn settle(&self, name: &str, passes: usize) -> Phase {
        for _ in 0..passes {
            if self.store.snapshot(RECORD_NAMESPACE, name).is_none() {
                break;
            }
            let action = self.reconcile(name).await.expect("reconcile");
            if action == Action::await_change() {
                break;
            }
        }
        self.phase(name)
    }

    /// Namespace executions are created in
    pub fn execution_namespace(&self) -> &str {
        &self.ctx.config.execution_namespace
    }

    /// Execution resource name held by a record
    pub fn execution_name(&self, name: &str) -> String {
        self.status(name)
            .execution_resource_name
            .unwrap_or_else(|| panic!("record {name} has no execution resource"))
    }

    /// Fail the execution of a record with a single failed step
    pub fn fail_with_step(&self, name: &str, task: &str, message: &str) {
        let namespace = self.execution_namespace().to_string();
        let execution = self.execution_name(name);
        let now = Utc::now();
        self.engine.add_unit(
            &namespace,
            &execution,
            unit(&execution, "validate", ConditionState::True, "Succeeded", "done", now),
        );
        self.engine.add_unit(
            &namespace,
            &execution,
            unit(&execution, task, ConditionState::False, "Failed", message, now),
        );
        self.engine.fail(
            &namespace,
            &execution,
            "Failed",
            "Tasks Completed: 2 (Failed: 1, Cancelled 0), Skipped: 0",
        );
    }
}

/// Unstored record for `target`
pub fn record(name: &str, target: &str) -> WorkflowExecution {
    let mut record = WorkflowExecution::new(
        name,
        WorkflowExecutionSpec {
            target_resource: target.to_string(),
            workflow_ref: WorkflowRef {
                container_image: "ghcr.io/octopilot/workflows/restart-deployment:v1.2.0"
                    .to_string(),
                workflow_id: "restart-deployment".to_string(),
            },
            parameters: BTreeMap::from([
                ("NAMESPACE".to_string(), "ns".to_string()),
                ("DEPLOYMENT".to_string(), "app-1".to_string()),
            ]),
            execution_config: None,
        },
    );
    record.metadata.namespace = Some(RECORD_NAMESPACE.to_string());
    record
}

pub fn unit(
    execution: &str,
    task: &str,
    state: ConditionState,
    reason: &str,
    message: &str,
    at: DateTime<Utc>,
) -> UnitSnapshot {
    UnitSnapshot {
        name: format!("{execution}-{task}"),
        pipeline_task: Some(task.to_string()),
        condition: Some(CompletionCondition {
            state,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }),
        start_time: Some(at - chrono::Duration::seconds(30)),
        completion_time: Some(at),
        exit_code: None,
        termination_reason: None,
    }
}

/// Configuration with no cooldown between attempts
pub fn no_cooldown_config() -> ControllerConfig {
    ControllerConfig {
        base_cooldown_secs: 0,
        max_cooldown_secs: 0,
        cooldown_period_secs: 0,
        ..ControllerConfig::default()
    }
}
