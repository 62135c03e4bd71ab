//! # Reconciliation Logic
//!
//! Entry point for `WorkflowExecution` reconciliation.
//!
//! ## Flow
//!
//! 1. deletion marker: clean up and release the finalizer
//! 2. add the cleanup finalizer
//! 3. dispatch on phase:
//!    - `Pending`: validate, lock, cooldown, submit ([`pending`])
//!    - `Running`: poll the execution resource ([`running`])
//!    - `Completed`/`Failed`: wait out the cooldown and release the lock ([`terminal`])
//!    - `Skipped`: nothing left to do

mod finalize;
mod pending;
mod running;
mod terminal;

pub use finalize::{ensure_finalizer, handle_deletion};

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Phase, WorkflowExecution};
use futures::FutureExt;
use kube_runtime::controller::Action;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, Instrument};

/// Reconcile one `WorkflowExecution`
///
/// Errors are handled by the error policy in the watch loop. A panic inside
/// a handler is caught and returned as [`ReconcilerError::Panicked`].
///
/// # Errors
///
/// Returns store and engine errors that could not be resolved in this pass.
pub async fn reconcile(
    record: Arc<WorkflowExecution>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let span = tracing::info_span!(
        "reconcile",
        resource.name = record.metadata.name.as_deref().unwrap_or("unknown"),
        resource.namespace = record.metadata.namespace.as_deref().unwrap_or("default"),
        resource.kind = "WorkflowExecution",
        phase = record.phase().as_str(),
    );

    ctx.metrics.increment_reconciliations();

    let result = AssertUnwindSafe(dispatch(&record, &ctx))
        .catch_unwind()
        .instrument(span)
        .await;

    ctx.metrics
        .observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                record.id = record.record_id().as_str(),
                panic = message.as_str(),
                "Reconciliation panicked"
            );
            Err(ReconcilerError::Panicked(message))
        }
    }
}

async fn dispatch(record: &WorkflowExecution, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if record.is_being_deleted() {
        return handle_deletion(ctx, record).await;
    }

    let record = ensure_finalizer(ctx, record).await?;

    debug!(phase = record.phase().as_str(), "Dispatching on phase");
    match record.phase() {
        Phase::Pending => pending::handle(ctx, &record).await,
        Phase::Running => running::handle(ctx, &record).await,
        Phase::Completed | Phase::Failed => terminal::handle(ctx, &record).await,
        Phase::Skipped => Ok(Action::await_change()),
    }
}
