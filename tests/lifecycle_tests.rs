//! # Record Lifecycle Tests
//!
//! Submission outcomes, polling, cleanup after the cooldown period,
//! finalization and conflicting writes.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{no_cooldown_config, record, Harness, RECORD_NAMESPACE, TARGET};
    use kube_runtime::controller::Action;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use workflow_execution_controller::constants::CLEANUP_FINALIZER;
    use workflow_execution_controller::controller::reconciler::execution::back_reference_labels;
    use workflow_execution_controller::prelude::*;

    mod submission_tests {
        use super::*;

        #[tokio::test]
        async fn test_finalizer_is_added_before_submission() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.reconcile("restart-1").await.expect("reconcile");
            let finalizers = h.get("restart-1").metadata.finalizers.unwrap_or_default();
            assert_eq!(finalizers, vec![CLEANUP_FINALIZER.to_string()]);
        }

        #[tokio::test]
        async fn test_invalid_spec_fails_without_submission() {
            let h = Harness::new();
            let mut invalid = record("restart-1", "deployment");
            invalid.spec.workflow_ref.container_image = String::new();
            h.store.insert(invalid);

            assert_eq!(h.settle("restart-1", 3).await, Phase::Failed);
            let details = h.status("restart-1").failure_details.expect("failure details");
            assert_eq!(details.reason, FailureReason::ConfigurationError);
            assert_eq!(details.category, FailureCategory::Validation);
            assert!(!details.was_execution_failure);
            assert!(h.engine.requests().is_empty());
        }

        #[tokio::test]
        async fn test_forbidden_submission_is_permission_denied() {
            let h = Harness::new();
            h.engine.inject_create_error(EngineError::Forbidden(
                "pipelineruns.tekton.dev is forbidden".into(),
            ));
            h.create("restart-1", TARGET);

            assert_eq!(h.settle("restart-1", 3).await, Phase::Failed);
            let status = h.status("restart-1");
            let details = status.failure_details.expect("failure details");
            assert_eq!(details.reason, FailureReason::PermissionDenied);
            assert!(!details.was_execution_failure);
            assert!(status.execution_resource_name.is_none());
            assert_eq!(status.consecutive_failures, 1);
        }

        #[tokio::test]
        async fn test_transient_submission_errors_are_retried() {
            let h = Harness::new();
            h.engine
                .inject_create_error(EngineError::Transient("503 Service Unavailable".into()));
            h.create("restart-1", TARGET);

            let action = h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(action, Action::requeue(Duration::from_secs(5)));
            assert_eq!(h.phase("restart-1"), Phase::Pending);

            h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(h.phase("restart-1"), Phase::Running);
        }

        #[tokio::test]
        async fn test_submission_gives_up_after_max_attempts() {
            let h = Harness::with_config(ControllerConfig {
                max_submission_attempts: 3,
                ..ControllerConfig::default()
            });
            for _ in 0..3 {
                h.engine
                    .inject_create_error(EngineError::Transient("connection reset".into()));
            }
            h.create("restart-1", TARGET);

            let first = h.reconcile("restart-1").await.expect("reconcile");
            let second = h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(first, Action::requeue(Duration::from_secs(5)));
            assert_eq!(second, Action::requeue(Duration::from_secs(10)));
            assert_eq!(h.phase("restart-1"), Phase::Pending);

            h.reconcile("restart-1").await.expect("reconcile");
            let details = h.status("restart-1").failure_details.expect("failure details");
            assert_eq!(details.reason, FailureReason::ExternalDependencyUnavailable);
            assert!(!details.was_execution_failure);
            assert!(details.message.contains("3 attempts"));
        }

        #[tokio::test]
        async fn test_replayed_create_adopts_own_execution() {
            let h = Harness::new();
            let stored = h.create("restart-1", TARGET);
            h.engine.put(ExecutionSnapshot {
                name: execution_resource_name(TARGET),
                namespace: h.execution_namespace().to_string(),
                labels: back_reference_labels(&stored),
                condition: None,
                start_time: Some(chrono::Utc::now()),
                completion_time: None,
            });

            assert_eq!(h.settle("restart-1", 1).await, Phase::Running);
            assert!(h.engine.requests().is_empty());
            assert_eq!(h.execution_name("restart-1"), execution_resource_name(TARGET));
        }

        #[tokio::test]
        async fn test_orphaned_execution_is_already_exists() {
            let h = Harness::new();
            h.engine.put(ExecutionSnapshot {
                name: execution_resource_name(TARGET),
                namespace: h.execution_namespace().to_string(),
                labels: BTreeMap::new(),
                condition: None,
                start_time: None,
                completion_time: None,
            });
            h.create("restart-1", TARGET);

            assert_eq!(h.settle("restart-1", 3).await, Phase::Skipped);
            let skip = h.status("restart-1").skip_details.expect("skip details");
            assert_eq!(skip.reason, SkipReason::AlreadyExists);
            assert_eq!(
                skip.conflicting_execution,
                Some(execution_resource_name(TARGET))
            );
            assert_eq!(h.metrics.lock_checks("name_conflict"), 1);
        }

        #[tokio::test]
        async fn test_execution_overrides_reach_the_engine() {
            let h = Harness::new();
            let mut custom = record("restart-1", TARGET);
            custom.spec.execution_config = Some(ExecutionConfig {
                service_account_name: Some("custom-runner".to_string()),
                timeout: Some("1h30m".to_string()),
            });
            h.store.insert(custom);
            h.settle("restart-1", 1).await;

            let requests = h.engine.requests();
            assert_eq!(requests[0].service_account, "custom-runner");
            assert_eq!(requests[0].timeout.as_deref(), Some("1h30m"));
            assert_eq!(requests[0].workflow_id, "restart-deployment");
        }
    }

    mod polling_tests {
        use super::*;

        #[tokio::test]
        async fn test_running_execution_is_polled() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .start(h.execution_namespace(), &h.execution_name("restart-1"));

            let action = h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(action, Action::requeue(Duration::from_secs(10)));
            assert_eq!(h.phase("restart-1"), Phase::Running);
        }

        #[tokio::test]
        async fn test_success_completes_the_record() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .succeed(h.execution_namespace(), &h.execution_name("restart-1"));

            let action = h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(action, Action::requeue(Duration::from_secs(300)));

            let status = h.status("restart-1");
            assert_eq!(status.phase, Phase::Completed);
            assert!(status.completion_time.is_some());
            assert!(status.failure_details.is_none());
            assert_eq!(status.conditions[0].status, "True");

            let phases: Vec<(Phase, Phase)> = h
                .audit
                .events_for("remediation/restart-1")
                .into_iter()
                .map(|e| (e.previous_phase, e.phase))
                .collect();
            assert_eq!(
                phases,
                vec![
                    (Phase::Pending, Phase::Running),
                    (Phase::Running, Phase::Completed)
                ]
            );
            assert_eq!(h.metrics.phase_transitions("Completed"), 1);
        }

        #[tokio::test]
        async fn test_vanished_execution_fails_the_record() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .remove(h.execution_namespace(), &h.execution_name("restart-1"));

            h.reconcile("restart-1").await.expect("reconcile");
            let details = h.status("restart-1").failure_details.expect("failure details");
            assert_eq!(details.reason, FailureReason::Unknown);
            assert_eq!(details.category, FailureCategory::System);
            assert!(details.was_execution_failure);
        }

        #[tokio::test]
        async fn test_run_level_timeout_is_deadline_exceeded() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine.fail(
                h.execution_namespace(),
                &h.execution_name("restart-1"),
                "PipelineRunTimeout",
                "PipelineRun \"wfe-1\" failed to finish within \"30m0s\"",
            );

            h.reconcile("restart-1").await.expect("reconcile");
            let details = h.status("restart-1").failure_details.expect("failure details");
            assert_eq!(details.reason, FailureReason::DeadlineExceeded);
            assert!(details.failed_unit_name.is_none());
            assert!(details.was_execution_failure);
        }
    }

    mod cleanup_tests {
        use super::*;

        #[tokio::test]
        async fn test_execution_is_kept_during_cooldown_period() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            let execution = h.execution_name("restart-1");
            h.engine.succeed(h.execution_namespace(), &execution);
            h.settle("restart-1", 3).await;

            assert_eq!(h.phase("restart-1"), Phase::Completed);
            assert!(!h.status("restart-1").lock_released);
            assert!(h.engine.exists(h.execution_namespace(), &execution));

            h.create("restart-2", TARGET);
            assert_eq!(h.settle("restart-2", 3).await, Phase::Skipped);
            let skip = h.status("restart-2").skip_details.expect("skip details");
            assert_eq!(skip.reason, SkipReason::RecentlyRemediated);
            assert_eq!(skip.conflicting_execution.as_deref(), Some("remediation/restart-1"));
        }

        #[tokio::test]
        async fn test_execution_is_deleted_after_cooldown_period() {
            let h = Harness::with_config(no_cooldown_config());
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            let execution = h.execution_name("restart-1");
            h.engine.succeed(h.execution_namespace(), &execution);
            h.settle("restart-1", 3).await;

            assert!(h.status("restart-1").lock_released);
            assert!(!h.engine.exists(h.execution_namespace(), &execution));
            assert_eq!(h.engine.deleted(), vec![execution]);

            h.create("restart-2", TARGET);
            assert_eq!(h.settle("restart-2", 1).await, Phase::Running);
        }

        #[tokio::test]
        async fn test_pre_execution_failure_releases_without_delete() {
            let h = Harness::new();
            h.engine
                .inject_create_error(EngineError::Forbidden("forbidden".into()));
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;

            let action = h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(action, Action::await_change());
            assert!(h.status("restart-1").lock_released);
            assert!(h.engine.deleted().is_empty());
        }
    }

    mod finalizer_tests {
        use super::*;

        #[tokio::test]
        async fn test_deleting_running_record_cancels_execution() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            let execution = h.execution_name("restart-1");

            h.store.delete(RECORD_NAMESPACE, "restart-1");
            h.reconcile("restart-1").await.expect("finalize");

            assert!(h.store.snapshot(RECORD_NAMESPACE, "restart-1").is_none());
            assert_eq!(h.engine.deleted(), vec![execution]);

            h.create("restart-2", TARGET);
            assert_eq!(h.settle("restart-2", 1).await, Phase::Running);
        }

        #[tokio::test]
        async fn test_deletion_leaves_foreign_execution_alone() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.create("restart-2", TARGET);
            h.settle("restart-2", 1).await;
            assert_eq!(h.phase("restart-2"), Phase::Skipped);

            h.store.delete(RECORD_NAMESPACE, "restart-2");
            h.reconcile("restart-2").await.expect("finalize");

            assert!(h.store.snapshot(RECORD_NAMESPACE, "restart-2").is_none());
            assert!(h.engine.deleted().is_empty());
            assert_eq!(h.phase("restart-1"), Phase::Running);
        }

        #[tokio::test]
        async fn test_transient_delete_error_keeps_finalizer() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .inject_delete_error(EngineError::Transient("etcd timeout".into()));

            h.store.delete(RECORD_NAMESPACE, "restart-1");
            let err = h.reconcile("restart-1").await.expect_err("transient delete");
            assert!(err.is_transient());
            assert!(h.store.snapshot(RECORD_NAMESPACE, "restart-1").is_some());

            h.reconcile("restart-1").await.expect("finalize");
            assert!(h.store.snapshot(RECORD_NAMESPACE, "restart-1").is_none());
        }

        #[tokio::test]
        async fn test_permanent_delete_error_releases_finalizer() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .inject_delete_error(EngineError::Forbidden("cannot delete".into()));

            h.store.delete(RECORD_NAMESPACE, "restart-1");
            h.reconcile("restart-1").await.expect("finalize");
            assert!(h.store.snapshot(RECORD_NAMESPACE, "restart-1").is_none());
        }
    }

    mod conflict_tests {
        use super::*;

        #[tokio::test]
        async fn test_conflicting_status_write_is_retried() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .succeed(h.execution_namespace(), &h.execution_name("restart-1"));

            h.store.inject_conflicts(2);
            h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(h.phase("restart-1"), Phase::Completed);
        }

        #[tokio::test]
        async fn test_conflict_retries_are_bounded() {
            let h = Harness::new();
            h.create("restart-1", TARGET);
            h.settle("restart-1", 1).await;
            h.engine
                .succeed(h.execution_namespace(), &h.execution_name("restart-1"));

            h.store.inject_conflicts(4);
            let err = h.reconcile("restart-1").await.expect_err("conflicts");
            assert!(matches!(err, ReconcilerError::ConflictRetriesExhausted(_)));
            assert!(err.is_transient());
            assert_eq!(h.phase("restart-1"), Phase::Running);

            h.reconcile("restart-1").await.expect("reconcile");
            assert_eq!(h.phase("restart-1"), Phase::Completed);
        }
    }
}
