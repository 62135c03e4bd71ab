//! # Watch Loop
//!
//! Controller watch loop over `WorkflowExecution` resources.
//!
//! PipelineRuns in the execution namespace are watched too and mapped back to
//! their record through the back-reference labels, so a finished run wakes
//! its record without waiting for the next poll.

use crate::config::ControllerConfig;
use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::reconciler::lock::owner_of;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::WorkflowExecution;
use crate::provider::kubernetes::pipeline_run_api_resource;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Record a PipelineRun belongs to, from its back-reference labels
fn record_for_pipeline_run(run: &DynamicObject) -> Option<ObjectRef<WorkflowExecution>> {
    owner_of(run.labels()).map(|(namespace, name)| ObjectRef::new(&name).within(&namespace))
}

/// Run the controller watch loop
///
/// Restarts the controller after watch stream errors and exits once a
/// shutdown signal has been received.
///
/// # Errors
///
/// Currently always returns `Ok`; errors inside the loop are logged and the
/// watch is restarted.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    // SIGTERM/SIGINT: mark not ready and let in-flight reconciliations finish
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    let pipeline_run_selector = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}");

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let records: Api<WorkflowExecution> = Api::all(client.clone());
        let pipeline_runs: Api<DynamicObject> = Api::namespaced_with(
            client.clone(),
            &config.execution_namespace,
            &pipeline_run_api_resource(),
        );

        let backoff = Arc::clone(&backoff_duration_ms);
        let filter_config = Arc::clone(&config);
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!(
            execution.namespace = config.execution_namespace.as_str(),
            concurrency = config.max_concurrent_reconciliations,
            "Starting controller watch loop..."
        );
        Controller::new(records, watcher::Config::default().any_semantic())
            .watches_with(
                pipeline_runs,
                pipeline_run_api_resource(),
                watcher::Config::default().labels(&pipeline_run_selector),
                |run| record_for_pipeline_run(&run),
            )
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff);
                let config = Arc::clone(&filter_config);
                async move {
                    match &event {
                        Ok((object, _action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!(resource.name = object.name.as_str(), "watch.event.success");
                            Some(event)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| event)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
