//! # Audit
//!
//! One event per phase transition, handed to an [`AuditSink`] without waiting
//! for or reacting to the outcome.

use crate::crd::{FailureReason, Phase, SkipReason, WorkflowExecution};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Phase transition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// `namespace/name` of the record
    pub record_id: String,
    pub target_resource: String,
    pub phase: Phase,
    pub previous_phase: Phase,
    pub execution_resource_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    pub skip_reason: Option<SkipReason>,
    pub emitted_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Event describing `record` after it moved from `previous_phase`
    #[must_use]
    pub fn for_transition(record: &WorkflowExecution, previous_phase: Phase) -> Self {
        let status = record.status.clone().unwrap_or_default();
        Self {
            event_id: Uuid::new_v4(),
            record_id: record.record_id(),
            target_resource: record.spec.target_resource.clone(),
            phase: status.phase,
            previous_phase,
            execution_resource_name: status.execution_resource_name,
            start_time: status.start_time,
            completion_time: status.completion_time,
            failure_reason: status.failure_details.map(|d| d.reason),
            skip_reason: status.skip_details.map(|d| d.reason),
            emitted_at: Utc::now(),
        }
    }
}

/// Fire-and-forget destination for audit events
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: AuditEvent);
}

/// Writes each event as a structured log line on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(
            target: "audit",
            event_id = %event.event_id,
            record_id = event.record_id.as_str(),
            target_resource = event.target_resource.as_str(),
            phase = event.phase.as_str(),
            previous_phase = event.previous_phase.as_str(),
            payload = payload.as_str(),
            "workflow execution phase transition"
        );
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events for one record, oldest first
    #[must_use]
    pub fn events_for(&self, record_id: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.record_id == record_id)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
