//! # Observability
//!
//! - `audit`: phase transition events and their sinks
//! - `logging`: tracing subscriber setup
//! - `metrics`: Prometheus metrics collection

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use metrics::Metrics;
