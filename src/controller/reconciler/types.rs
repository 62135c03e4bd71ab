//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::observability::{AuditSink, Metrics};
use crate::provider::{EngineError, ExecutionEngine, RecordStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
    #[error("execution engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("gave up on {0} after repeated conflicting updates")]
    ConflictRetriesExhausted(String),
    #[error("reconciliation panicked: {0}")]
    Panicked(String),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Errors expected to clear up on their own; requeued on the short interval
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcilerError::Store(e) => e.is_transient(),
            ReconcilerError::Engine(EngineError::Transient(_))
            | ReconcilerError::ConflictRetriesExhausted(_) => true,
            _ => false,
        }
    }
}

/// Transient submission retry state for one record
/// Held in memory by the replica; a restart starts the sequence over
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub attempts: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: config.submission_backoff(),
            attempts: 0,
        }
    }

    /// Count a failed attempt and return the delay before the next one
    pub fn record_attempt(&mut self) -> Duration {
        self.attempts += 1;
        self.backoff.next_backoff()
    }
}

/// Reconciler context shared by every reconciliation
#[derive(Clone)]
pub struct Reconciler {
    pub records: Arc<dyn RecordStore>,
    pub engine: Arc<dyn ExecutionEngine>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<ControllerConfig>,
    // Submission retry state per record (identified by namespace/name)
    pub submission_backoffs: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("records", &self.records)
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        engine: Arc<dyn ExecutionEngine>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<Metrics>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            records,
            engine,
            audit,
            metrics,
            config,
            submission_backoffs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a failed submission for `record_id`
    ///
    /// Returns the attempts made so far and the delay before the next one.
    pub fn record_submission_attempt(&self, record_id: &str) -> (u32, Duration) {
        match self.submission_backoffs.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(record_id.to_string())
                    .or_insert_with(|| BackoffState::new(&self.config));
                let delay = state.record_attempt();
                (state.attempts, delay)
            }
            Err(e) => {
                tracing::warn!("Failed to lock submission_backoffs: {}, using default backoff", e);
                (1, Duration::from_millis(self.config.submission_backoff_start_ms))
            }
        }
    }

    /// Forget submission retry state for `record_id`
    pub fn clear_submission_attempts(&self, record_id: &str) {
        if let Ok(mut states) = self.submission_backoffs.lock() {
            states.remove(record_id);
        }
    }
}
