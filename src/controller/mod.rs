//! # Controller
//!
//! Core controller modules for the Workflow Execution Controller.
//!
//! - `backoff`: cooldown and submission backoff calculations
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
