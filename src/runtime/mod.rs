//! # Runtime
//!
//! Process startup and the controller watch loop.
//!
//! - `initialization`: tracing, metrics, HTTP server, Kubernetes client and reconciler context
//! - `watch_loop`: the kube-runtime `Controller` and its restart loop
//! - `error_policy`: reconciliation error requeues and watch stream error classification

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
