//! # Error Policy
//!
//! Error handling for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::WorkflowExecution;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Requeue delay for a failed reconciliation
///
/// Transient store and engine errors come back on the short interval; every
/// other error is treated as a system fault and waits the long fixed delay.
#[must_use]
pub fn requeue_delay(error: &ReconcilerError, ctx: &Reconciler) -> Duration {
    if error.is_transient() {
        ctx.config.transient_error_requeue_duration()
    } else {
        ctx.config.reconciliation_error_requeue_duration()
    }
}

/// Handle reconciliation errors
pub fn handle_reconciliation_error(
    obj: Arc<WorkflowExecution>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    ctx.metrics.increment_reconciliation_errors();
    let delay = requeue_delay(error, &ctx);

    if error.is_transient() {
        warn!(
            retry_in_secs = delay.as_secs(),
            "Transient reconciliation error for {}/{}: {}", namespace, name, error
        );
    } else {
        error!(
            retry_in_secs = delay.as_secs(),
            "Reconciliation error for {}/{}: {:?}", namespace, name, error
        );
    }

    Action::requeue(delay)
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// This function classifies watch errors (401, 410, 429, not found, etc.) and
/// applies appropriate handling strategies including backoff and restart logic.
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    // 404 before 401: a plain-text 404 body surfaces as a serde error mentioning "WatchFailed"
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
        error!("   1. Verify ClusterRole 'workflow-execution-controller' still exists:");
        error!("      kubectl get clusterrole workflow-execution-controller");
        error!("   2. Verify RBAC permissions for WorkflowExecutions and PipelineRuns:");
        error!(
            "      kubectl auth can-i list workflowexecutions --as=system:serviceaccount:octopilot-system:workflow-execution-controller --all-namespaces"
        );
        error!(
            "      kubectl auth can-i create pipelineruns.tekton.dev --as=system:serviceaccount:octopilot-system:workflow-execution-controller -n remediation-workflows"
        );
        warn!(
            "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
            watch_restart_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        None
    } else if is_410 {
        warn!(
            error_type = "410",
            "Watch resource version expired (410) - normal during pod restarts, watch will restart"
        );
        None
    } else if is_429 {
        let current_backoff = backoff.load(Ordering::Relaxed);
        warn!(
            "API server storage reinitializing (429), backing off for {}ms before restart...",
            current_backoff
        );
        tokio::time::sleep(Duration::from_millis(current_backoff)).await;
        let new_backoff = std::cmp::min(current_backoff.saturating_mul(2), max_backoff_ms);
        backoff.store(new_backoff, Ordering::Relaxed);
        None
    } else if is_not_found {
        let resource_info = if error_string.contains("integer `404`") {
            "CRD or resource may have been deleted (404 returned as plain text)"
        } else if error_string.contains("WorkflowExecution") {
            "WorkflowExecution resource"
        } else if error_string.contains("PipelineRun") {
            "Tekton PipelineRun resource (is Tekton installed?)"
        } else {
            "Resource"
        };
        warn!(
            "{} not found (404) - this may be normal if the resource was deleted or the CRD is missing. Error: {}",
            resource_info, error_string
        );
        Some(())
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_410_restarts_without_backoff() {
        let backoff = Arc::new(AtomicU64::new(1000));
        let result =
            handle_watch_stream_error("ErrorResponse { code: 410, reason: \"Expired\" }", &backoff, 30_000, 5)
                .await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(20_000));
        let result = handle_watch_stream_error("429 TooManyRequests", &backoff, 30_000, 5).await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_continues() {
        let backoff = Arc::new(AtomicU64::new(1000));
        let result = handle_watch_stream_error(
            "ObjectNotFound: workflowexecutions.remediation.octopilot.io",
            &backoff,
            30_000,
            5,
        )
        .await;
        assert!(result.is_some());
    }
}
