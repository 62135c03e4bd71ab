//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_BASE_COOLDOWN_SECS,
    DEFAULT_CONFLICT_RETRY_LIMIT, DEFAULT_COOLDOWN_PERIOD_SECS, DEFAULT_EXECUTION_NAMESPACE,
    DEFAULT_EXECUTION_SERVICE_ACCOUNT, DEFAULT_MAX_BACKOFF_EXPONENT,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_MAX_CONSECUTIVE_FAILURES,
    DEFAULT_MAX_COOLDOWN_SECS, DEFAULT_MAX_SUBMISSION_ATTEMPTS, DEFAULT_METRICS_PORT,
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, DEFAULT_STATUS_POLL_INTERVAL_SECS,
    DEFAULT_SUBMISSION_BACKOFF_MAX_MS, DEFAULT_SUBMISSION_BACKOFF_START_MS,
    DEFAULT_TRANSIENT_ERROR_REQUEUE_SECS, DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use crate::controller::backoff::{CooldownBackoff, ExponentialBackoff};
use anyhow::{ensure, Result};
use std::time::Duration;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
/// The configuration is static: changes require a pod restart.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cooldown after the first consecutive pre-execution failure (seconds)
    pub base_cooldown_secs: u64,
    /// Upper bound of the exponential cooldown (seconds)
    pub max_cooldown_secs: u64,
    /// Cap on the exponent applied to the base cooldown
    pub max_backoff_exponent: u32,
    /// Consecutive pre-execution failures after which a target is blocked
    pub max_consecutive_failures: u32,
    /// How long the execution resource is kept after a terminal outcome (seconds)
    /// While it exists, its deterministic name keeps the target locked
    pub cooldown_period_secs: u64,
    /// Poll interval while a PipelineRun is in flight (seconds)
    pub status_poll_interval_secs: u64,
    /// First retry delay after a transient submission error (milliseconds)
    pub submission_backoff_start_ms: u64,
    /// Maximum retry delay after transient submission errors (milliseconds)
    pub submission_backoff_max_ms: u64,
    /// Submission attempts before the record is marked Failed
    pub max_submission_attempts: u32,
    /// Re-reads after an optimistic concurrency conflict before giving up
    pub conflict_retry_limit: u32,
    /// Requeue interval after unexpected (system) errors (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Requeue interval after transient store/engine errors (seconds)
    pub transient_error_requeue_secs: u64,
    /// Namespace where PipelineRuns are created
    pub execution_namespace: String,
    /// Service account PipelineRuns execute as, unless overridden per record
    pub execution_service_account: String,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Exponential backoff starting value for watch errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to come up (seconds)
    pub server_startup_timeout_secs: u64,
    /// Poll interval while waiting for the HTTP server (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE), used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_cooldown_secs: DEFAULT_BASE_COOLDOWN_SECS,
            max_cooldown_secs: DEFAULT_MAX_COOLDOWN_SECS,
            max_backoff_exponent: DEFAULT_MAX_BACKOFF_EXPONENT,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            cooldown_period_secs: DEFAULT_COOLDOWN_PERIOD_SECS,
            status_poll_interval_secs: DEFAULT_STATUS_POLL_INTERVAL_SECS,
            submission_backoff_start_ms: DEFAULT_SUBMISSION_BACKOFF_START_MS,
            submission_backoff_max_ms: DEFAULT_SUBMISSION_BACKOFF_MAX_MS,
            max_submission_attempts: DEFAULT_MAX_SUBMISSION_ATTEMPTS,
            conflict_retry_limit: DEFAULT_CONFLICT_RETRY_LIMIT,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            transient_error_requeue_secs: DEFAULT_TRANSIENT_ERROR_REQUEUE_SECS,
            execution_namespace: DEFAULT_EXECUTION_NAMESPACE.to_string(),
            execution_service_account: DEFAULT_EXECUTION_SERVICE_ACCOUNT.to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_cooldown_secs: env_var_or_default("BASE_COOLDOWN_SECS", defaults.base_cooldown_secs),
            max_cooldown_secs: env_var_or_default("MAX_COOLDOWN_SECS", defaults.max_cooldown_secs),
            max_backoff_exponent: env_var_or_default(
                "MAX_BACKOFF_EXPONENT",
                defaults.max_backoff_exponent,
            ),
            max_consecutive_failures: env_var_or_default(
                "MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            ),
            cooldown_period_secs: env_var_or_default(
                "COOLDOWN_PERIOD_SECS",
                defaults.cooldown_period_secs,
            ),
            status_poll_interval_secs: env_var_or_default(
                "STATUS_POLL_INTERVAL_SECS",
                defaults.status_poll_interval_secs,
            ),
            submission_backoff_start_ms: env_var_or_default(
                "SUBMISSION_BACKOFF_START_MS",
                defaults.submission_backoff_start_ms,
            ),
            submission_backoff_max_ms: env_var_or_default(
                "SUBMISSION_BACKOFF_MAX_MS",
                defaults.submission_backoff_max_ms,
            ),
            max_submission_attempts: env_var_or_default(
                "MAX_SUBMISSION_ATTEMPTS",
                defaults.max_submission_attempts,
            ),
            conflict_retry_limit: env_var_or_default(
                "CONFLICT_RETRY_LIMIT",
                defaults.conflict_retry_limit,
            ),
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                defaults.reconciliation_error_requeue_secs,
            ),
            transient_error_requeue_secs: env_var_or_default(
                "TRANSIENT_ERROR_REQUEUE_SECS",
                defaults.transient_error_requeue_secs,
            ),
            execution_namespace: env_var_or_default_str(
                "EXECUTION_NAMESPACE",
                &defaults.execution_namespace,
            ),
            execution_service_account: env_var_or_default_str(
                "EXECUTION_SERVICE_ACCOUNT",
                &defaults.execution_service_account,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", defaults.backoff_start_ms),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                defaults.watch_restart_delay_after_end_secs,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", defaults.metrics_port),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.server_startup_timeout_secs,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                defaults.server_poll_interval_ms,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "json")),
        }
    }

    /// Reject combinations that would break the backoff or polling model
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.base_cooldown_secs <= self.max_cooldown_secs,
            "BASE_COOLDOWN_SECS ({}) must not exceed MAX_COOLDOWN_SECS ({})",
            self.base_cooldown_secs,
            self.max_cooldown_secs
        );
        ensure!(
            self.max_consecutive_failures >= 1,
            "MAX_CONSECUTIVE_FAILURES must be at least 1"
        );
        ensure!(
            self.status_poll_interval_secs >= 1,
            "STATUS_POLL_INTERVAL_SECS must be at least 1"
        );
        ensure!(
            self.max_submission_attempts >= 1,
            "MAX_SUBMISSION_ATTEMPTS must be at least 1"
        );
        ensure!(
            self.submission_backoff_start_ms <= self.submission_backoff_max_ms,
            "SUBMISSION_BACKOFF_START_MS must not exceed SUBMISSION_BACKOFF_MAX_MS"
        );
        ensure!(
            !self.execution_namespace.trim().is_empty(),
            "EXECUTION_NAMESPACE must not be empty"
        );
        ensure!(
            !self.execution_service_account.trim().is_empty(),
            "EXECUTION_SERVICE_ACCOUNT must not be empty"
        );
        ensure!(
            self.max_concurrent_reconciliations >= 1,
            "MAX_CONCURRENT_RECONCILIATIONS must be at least 1"
        );
        Ok(())
    }

    /// Exponential cooldown applied after consecutive pre-execution failures
    #[must_use]
    pub fn cooldown_backoff(&self) -> CooldownBackoff {
        CooldownBackoff::new(
            Duration::from_secs(self.base_cooldown_secs),
            Duration::from_secs(self.max_cooldown_secs),
            self.max_backoff_exponent,
        )
    }

    /// Fresh short-lived backoff for transient submission errors
    #[must_use]
    pub fn submission_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.submission_backoff_start_ms, self.submission_backoff_max_ms)
    }

    /// Get cooldown period duration
    #[must_use]
    pub fn cooldown_period(&self) -> Duration {
        Duration::from_secs(self.cooldown_period_secs)
    }

    /// Get status poll interval duration
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    /// Get reconciliation error requeue duration
    #[must_use]
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    /// Get transient error requeue duration
    #[must_use]
    pub fn transient_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.transient_error_requeue_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_cooldown_secs, 60);
        assert_eq!(config.max_cooldown_secs, 600);
        assert_eq!(config.max_backoff_exponent, 4);
        assert_eq!(config.max_consecutive_failures, 5);
    }

    #[test]
    fn test_base_cooldown_above_max_is_rejected() {
        let config = ControllerConfig {
            base_cooldown_secs: 900,
            ..ControllerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BASE_COOLDOWN_SECS"));
    }

    #[test]
    fn test_zero_consecutive_failures_is_rejected() {
        let config = ControllerConfig {
            max_consecutive_failures: 0,
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_execution_namespace_is_rejected() {
        let config = ControllerConfig {
            execution_namespace: "  ".to_string(),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("TEXT"), LogFormat::Text);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything-else"), LogFormat::Json);
    }

    #[test]
    fn test_cooldown_backoff_uses_configured_bounds() {
        let config = ControllerConfig::default();
        let backoff = config.cooldown_backoff();
        assert_eq!(backoff.delay_for(1), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(600));
    }
}
