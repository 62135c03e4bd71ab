//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `workflow_execution_reconciliations_total` - Total number of reconciliations
//! - `workflow_execution_reconciliation_errors_total` - Total number of reconciliation errors
//! - `workflow_execution_reconciliation_duration_seconds` - Duration of reconciliations
//! - `workflow_execution_phase_transitions_total{phase}` - Phase transitions by target phase
//! - `workflow_execution_lock_checks_total{outcome}` - Lock checks by outcome
//!   (`clear`, `busy`, `name_conflict`)
//! - `workflow_execution_skips_total{reason}` - Skipped records by skip reason
//! - `workflow_execution_backoff_activations_total` - Cooldowns started after
//!   pre-execution failures
//! - `workflow_execution_submission_duration_seconds` - Latency of execution submissions
//! - `workflow_execution_phase_duration_seconds{phase}` - Time spent in a phase
//!   before leaving it
//!
//! Metrics live on a [`Registry`] owned by the caller and are injected into
//! the reconciler, so tests can build isolated instances.

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Controller metrics registered on one registry
#[derive(Debug, Clone)]
pub struct Metrics {
    reconciliations: IntCounter,
    reconciliation_errors: IntCounter,
    reconciliation_duration: Histogram,
    phase_transitions: IntCounterVec,
    lock_checks: IntCounterVec,
    skips: IntCounterVec,
    backoff_activations: IntCounter,
    submission_duration: Histogram,
    phase_duration: HistogramVec,
}

impl Metrics {
    /// Create all metrics and register them on `registry`
    ///
    /// # Errors
    ///
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            reconciliations: IntCounter::new(
                "workflow_execution_reconciliations_total",
                "Total number of reconciliations",
            )?,
            reconciliation_errors: IntCounter::new(
                "workflow_execution_reconciliation_errors_total",
                "Total number of reconciliation errors",
            )?,
            reconciliation_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "workflow_execution_reconciliation_duration_seconds",
                    "Duration of reconciliation in seconds",
                )
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
            )?,
            phase_transitions: IntCounterVec::new(
                Opts::new(
                    "workflow_execution_phase_transitions_total",
                    "Total number of phase transitions by target phase",
                ),
                &["phase"],
            )?,
            lock_checks: IntCounterVec::new(
                Opts::new(
                    "workflow_execution_lock_checks_total",
                    "Total number of resource lock checks by outcome",
                ),
                &["outcome"],
            )?,
            skips: IntCounterVec::new(
                Opts::new(
                    "workflow_execution_skips_total",
                    "Total number of skipped executions by reason",
                ),
                &["reason"],
            )?,
            backoff_activations: IntCounter::new(
                "workflow_execution_backoff_activations_total",
                "Total number of cooldowns started after pre-execution failures",
            )?,
            submission_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "workflow_execution_submission_duration_seconds",
                    "Duration of execution resource submissions in seconds",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
            )?,
            phase_duration: HistogramVec::new(
                HistogramOpts::new(
                    "workflow_execution_phase_duration_seconds",
                    "Time spent in a phase before leaving it, in seconds",
                )
                .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
                &["phase"],
            )?,
        };

        registry.register(Box::new(metrics.reconciliations.clone()))?;
        registry.register(Box::new(metrics.reconciliation_errors.clone()))?;
        registry.register(Box::new(metrics.reconciliation_duration.clone()))?;
        registry.register(Box::new(metrics.phase_transitions.clone()))?;
        registry.register(Box::new(metrics.lock_checks.clone()))?;
        registry.register(Box::new(metrics.skips.clone()))?;
        registry.register(Box::new(metrics.backoff_activations.clone()))?;
        registry.register(Box::new(metrics.submission_duration.clone()))?;
        registry.register(Box::new(metrics.phase_duration.clone()))?;

        Ok(metrics)
    }

    /// Metrics on a private registry, for tests and local runs
    ///
    /// # Errors
    ///
    /// Fails only if metric construction fails.
    pub fn unregistered() -> Result<Self> {
        Self::new(&Registry::new())
    }

    pub fn increment_reconciliations(&self) {
        self.reconciliations.inc();
    }

    pub fn increment_reconciliation_errors(&self) {
        self.reconciliation_errors.inc();
    }

    pub fn observe_reconciliation_duration(&self, duration: f64) {
        self.reconciliation_duration.observe(duration);
    }

    pub fn increment_phase_transitions(&self, phase: &str) {
        self.phase_transitions.with_label_values(&[phase]).inc();
    }

    pub fn increment_lock_checks(&self, outcome: &str) {
        self.lock_checks.with_label_values(&[outcome]).inc();
    }

    pub fn increment_skips(&self, reason: &str) {
        self.skips.with_label_values(&[reason]).inc();
    }

    pub fn increment_backoff_activations(&self) {
        self.backoff_activations.inc();
    }

    pub fn observe_submission_duration(&self, duration: f64) {
        self.submission_duration.observe(duration);
    }

    pub fn observe_phase_duration(&self, phase: &str, duration: f64) {
        self.phase_duration
            .with_label_values(&[phase])
            .observe(duration);
    }

    #[must_use]
    pub fn phase_transitions(&self, phase: &str) -> u64 {
        self.phase_transitions.with_label_values(&[phase]).get()
    }

    #[must_use]
    pub fn skips(&self, reason: &str) -> u64 {
        self.skips.with_label_values(&[reason]).get()
    }

    #[must_use]
    pub fn lock_checks(&self, outcome: &str) -> u64 {
        self.lock_checks.with_label_values(&[outcome]).get()
    }

    #[must_use]
    pub fn backoff_activations(&self) -> u64 {
        self.backoff_activations.get()
    }

    #[must_use]
    pub fn reconciliation_errors(&self) -> u64 {
        self.reconciliation_errors.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once_per_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        metrics.increment_phase_transitions("Running");
        metrics.increment_skips("ResourceBusy");

        assert_eq!(metrics.phase_transitions("Running"), 1);
        assert_eq!(metrics.skips("ResourceBusy"), 1);
        assert!(Metrics::new(&registry).is_err());
    }

    #[test]
    fn test_gathered_families_include_transition_counter() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        metrics.increment_phase_transitions("Completed");
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert!(names.contains(&"workflow_execution_phase_transitions_total".to_string()));
    }
}
