//! # Resource Lock
//!
//! At most one running execution per target, enforced in two layers:
//!
//! 1. **Indexed query**: list records for the target and refuse to start when
//!    another one is `Running`.
//! 2. **Deterministic name**: the execution resource is named after a hash of
//!    the target, so a create that races past layer 1 is rejected by the API
//!    server with "already exists". [`resolve_name_conflict`] decides what that
//!    rejection means for the record.

use crate::constants::{
    EXECUTION_NAME_PREFIX, MAX_CONCURRENT_PER_TARGET, SOURCE_NAMESPACE_LABEL, TARGET_HASH_LENGTH,
    WORKFLOW_EXECUTION_LABEL,
};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{Phase, SkipDetails, SkipReason, WorkflowExecution};
use crate::provider::ExecutionSnapshot;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// First hex characters of `sha256(target)`
///
/// Used as the target index label and in execution resource names.
#[must_use]
pub fn target_hash(target: &str) -> String {
    let mut hash = hex::encode(Sha256::digest(target.as_bytes()));
    hash.truncate(TARGET_HASH_LENGTH);
    hash
}

/// Deterministic execution resource name for a target
#[must_use]
pub fn execution_resource_name(target: &str) -> String {
    format!("{EXECUTION_NAME_PREFIX}{}", target_hash(target))
}

/// `(namespace, name)` of the record named by an execution's back-reference labels
#[must_use]
pub fn owner_of(labels: &BTreeMap<String, String>) -> Option<(String, String)> {
    let name = labels.get(WORKFLOW_EXECUTION_LABEL)?;
    let namespace = labels.get(SOURCE_NAMESPACE_LABEL)?;
    Some((namespace.clone(), name.clone()))
}

/// True when the back-reference labels name `record`
#[must_use]
pub fn is_owned_by(labels: &BTreeMap<String, String>, record: &WorkflowExecution) -> bool {
    owner_of(labels).is_some_and(|(namespace, name)| {
        record.metadata.namespace.as_deref() == Some(namespace.as_str())
            && record.metadata.name.as_deref() == Some(name.as_str())
    })
}

/// Result of a lock check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Clear,
    Blocked(SkipDetails),
}

/// Layer 1: refuse when another record for the same target is `Running`
#[must_use]
pub fn check_running_siblings(
    record: &WorkflowExecution,
    siblings: &[WorkflowExecution],
    now: DateTime<Utc>,
) -> LockOutcome {
    let running: Vec<&WorkflowExecution> = siblings
        .iter()
        .filter(|s| !s.is_same_record(record))
        .filter(|s| s.phase() == Phase::Running)
        .collect();

    if running.len() < MAX_CONCURRENT_PER_TARGET {
        return LockOutcome::Clear;
    }

    let holder = running[0].record_id();
    LockOutcome::Blocked(SkipDetails {
        reason: SkipReason::ResourceBusy,
        message: format!(
            "Another workflow execution ({holder}) is already running for target {}",
            record.spec.target_resource
        ),
        conflicting_execution: Some(holder),
        skipped_at: now,
    })
}

/// What an "already exists" rejection means for the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameConflict {
    /// The resource belongs to this record: a replayed create, continue with it
    Adopt(ExecutionSnapshot),
    /// The resource belongs to someone else
    Blocked(SkipDetails),
    /// The resource vanished between create and lookup; try again
    Retry,
}

/// Layer 2: classify a name conflict by following the back-reference labels
///
/// # Errors
///
/// Returns an error when the execution engine or record store cannot be read.
pub async fn resolve_name_conflict(
    ctx: &Reconciler,
    record: &WorkflowExecution,
    execution_name: &str,
    now: DateTime<Utc>,
) -> Result<NameConflict, ReconcilerError> {
    let Some(existing) = ctx
        .engine
        .get(&ctx.config.execution_namespace, execution_name)
        .await?
    else {
        debug!(
            execution.name = execution_name,
            "Conflicting execution resource disappeared, retrying"
        );
        return Ok(NameConflict::Retry);
    };

    if is_owned_by(&existing.labels, record) {
        info!(
            execution.name = execution_name,
            "Execution resource already created for this record, adopting it"
        );
        return Ok(NameConflict::Adopt(existing));
    }

    let skip = |reason: SkipReason, message: String, conflicting: String| {
        NameConflict::Blocked(SkipDetails {
            reason,
            message,
            conflicting_execution: Some(conflicting),
            skipped_at: now,
        })
    };

    let Some((owner_namespace, owner_name)) = owner_of(&existing.labels) else {
        return Ok(skip(
            SkipReason::AlreadyExists,
            format!(
                "Execution resource {execution_name} exists for target {} without an owning workflow execution",
                record.spec.target_resource
            ),
            execution_name.to_string(),
        ));
    };

    let owner_id = format!("{owner_namespace}/{owner_name}");
    let owner = ctx.records.get(&owner_namespace, &owner_name).await?;
    Ok(match owner {
        None => skip(
            SkipReason::AlreadyExists,
            format!(
                "Execution resource {execution_name} exists for target {} but its owner {owner_id} no longer exists",
                record.spec.target_resource
            ),
            execution_name.to_string(),
        ),
        Some(owner) if owner.phase().is_terminal() => skip(
            SkipReason::RecentlyRemediated,
            format!(
                "Target {} was remediated by {owner_id}; its execution resource is held until the cooldown period ends",
                record.spec.target_resource
            ),
            owner_id,
        ),
        Some(_) => skip(
            SkipReason::ResourceBusy,
            format!(
                "Another workflow execution ({owner_id}) holds the execution lock for target {}",
                record.spec.target_resource
            ),
            owner_id,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{WorkflowExecutionSpec, WorkflowExecutionStatus, WorkflowRef};

    fn record(name: &str, phase: Phase) -> WorkflowExecution {
        let mut record = WorkflowExecution::new(
            name,
            WorkflowExecutionSpec {
                target_resource: "ns/deployment/app-1".to_string(),
                workflow_ref: WorkflowRef {
                    container_image: "img".to_string(),
                    workflow_id: "wf".to_string(),
                },
                parameters: BTreeMap::new(),
                execution_config: None,
            },
        );
        record.metadata.namespace = Some("remediation".to_string());
        record.status = Some(WorkflowExecutionStatus {
            phase,
            ..WorkflowExecutionStatus::default()
        });
        record
    }

    #[test]
    fn test_target_hash_is_deterministic() {
        let a = target_hash("ns/deployment/app-1");
        let b = target_hash("ns/deployment/app-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, target_hash("ns/deployment/app-2"));
    }

    #[test]
    fn test_target_hash_known_value() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(target_hash(""), "e3b0c44298fc1c14");
    }

    #[test]
    fn test_execution_resource_name_is_prefixed() {
        let name = execution_resource_name("ns/deployment/app-1");
        assert!(name.starts_with("wfe-"));
        assert_eq!(name.len(), 4 + 16);
    }

    #[test]
    fn test_running_sibling_blocks() {
        let me = record("b", Phase::Pending);
        let siblings = vec![record("a", Phase::Running), me.clone()];
        match check_running_siblings(&me, &siblings, Utc::now()) {
            LockOutcome::Blocked(skip) => {
                assert_eq!(skip.reason, SkipReason::ResourceBusy);
                assert_eq!(skip.conflicting_execution.as_deref(), Some("remediation/a"));
            }
            LockOutcome::Clear => panic!("expected ResourceBusy"),
        }
    }

    #[test]
    fn test_self_and_terminal_siblings_do_not_block() {
        let me = record("b", Phase::Running);
        let siblings = vec![
            me.clone(),
            record("a", Phase::Completed),
            record("c", Phase::Failed),
            record("d", Phase::Skipped),
        ];
        assert_eq!(
            check_running_siblings(&me, &siblings, Utc::now()),
            LockOutcome::Clear
        );
    }

    #[test]
    fn test_owner_labels() {
        let me = record("a", Phase::Pending);
        let labels = BTreeMap::from([
            (WORKFLOW_EXECUTION_LABEL.to_string(), "a".to_string()),
            (SOURCE_NAMESPACE_LABEL.to_string(), "remediation".to_string()),
        ]);
        assert!(is_owned_by(&labels, &me));
        assert!(!is_owned_by(&labels, &record("b", Phase::Pending)));
        assert!(owner_of(&BTreeMap::new()).is_none());
    }
}
