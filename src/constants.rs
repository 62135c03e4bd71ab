//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::ControllerConfig`]).

/// API group of the `WorkflowExecution` custom resource
pub const API_GROUP: &str = "remediation.octopilot.io";

/// Field manager name used for server-side writes
pub const FIELD_MANAGER: &str = "workflow-execution-controller";

/// Finalizer that blocks record deletion until the execution resource is removed
pub const CLEANUP_FINALIZER: &str = "remediation.octopilot.io/execution-cleanup";

/// Label on execution resources naming the owning record
pub const WORKFLOW_EXECUTION_LABEL: &str = "remediation.octopilot.io/workflow-execution";

/// Label on execution resources naming the owning record's namespace
pub const SOURCE_NAMESPACE_LABEL: &str = "remediation.octopilot.io/source-namespace";

/// Label carrying the target hash, used as the secondary index for records
/// and stamped on execution resources
pub const TARGET_HASH_LABEL: &str = "remediation.octopilot.io/target-hash";

/// Standard managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label
pub const MANAGED_BY_VALUE: &str = "workflow-execution-controller";

/// Annotation on a new record that discards inherited backoff counters
pub const RESET_BACKOFF_ANNOTATION: &str = "remediation.octopilot.io/reset-backoff";

/// Prefix of deterministic execution resource names
pub const EXECUTION_NAME_PREFIX: &str = "wfe-";

/// Number of hex characters of the target hash kept in names and labels
pub const TARGET_HASH_LENGTH: usize = 16;

/// Concurrent executions allowed per target resource (not configurable)
pub const MAX_CONCURRENT_PER_TARGET: usize = 1;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default base cooldown after the first pre-execution failure (seconds)
pub const DEFAULT_BASE_COOLDOWN_SECS: u64 = 60;

/// Default upper bound of the exponential cooldown (seconds)
pub const DEFAULT_MAX_COOLDOWN_SECS: u64 = 600;

/// Default cap on the backoff exponent
pub const DEFAULT_MAX_BACKOFF_EXPONENT: u32 = 4;

/// Default number of consecutive pre-execution failures before a target is blocked
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Default time an execution resource is kept after a terminal outcome (seconds)
pub const DEFAULT_COOLDOWN_PERIOD_SECS: u64 = 300;

/// Default poll interval while an execution is in flight (seconds)
pub const DEFAULT_STATUS_POLL_INTERVAL_SECS: u64 = 10;

/// Default first delay after a transient submission error (milliseconds)
pub const DEFAULT_SUBMISSION_BACKOFF_START_MS: u64 = 5_000;

/// Default maximum delay between submission retries (milliseconds)
pub const DEFAULT_SUBMISSION_BACKOFF_MAX_MS: u64 = 60_000;

/// Default number of submission attempts before the record is failed
pub const DEFAULT_MAX_SUBMISSION_ATTEMPTS: u32 = 5;

/// Default number of re-reads after an optimistic concurrency conflict
pub const DEFAULT_CONFLICT_RETRY_LIMIT: u32 = 3;

/// Default requeue interval for unexpected reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 300;

/// Default requeue interval for transient store/engine errors (seconds)
pub const DEFAULT_TRANSIENT_ERROR_REQUEUE_SECS: u64 = 15;

/// Default namespace where PipelineRuns are created
pub const DEFAULT_EXECUTION_NAMESPACE: &str = "remediation-workflows";

/// Default service account PipelineRuns execute as
pub const DEFAULT_EXECUTION_SERVICE_ACCOUNT: &str = "remediation-workflow-runner";

/// Default maximum concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default exponential backoff starting value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;
