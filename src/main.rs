//! # Workflow Execution Controller
//!
//! A Kubernetes controller that runs remediation workflows as Tekton
//! `PipelineRun`s, one at a time per target resource.
//!
//! ## Overview
//!
//! 1. **Watching `WorkflowExecution` resources** across all namespaces
//! 2. **Locking the target** - a running sibling or an existing `PipelineRun`
//!    with the target's deterministic name blocks a new execution
//! 3. **Backing off** - consecutive pre-execution failures delay the next
//!    attempt exponentially; a failed execution blocks the target until an
//!    operator intervenes
//! 4. **Delegating** the work to a Tekton `PipelineRun` and following it to
//!    completion
//! 5. **Cleaning up** the `PipelineRun` after the cooldown period or when the
//!    record is deleted

use anyhow::Result;
use workflow_execution_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(init.client, init.reconciler, init.server_state, init.config)
        .await
}
