//! # Configuration
//!
//! Process-wide settings, read once at startup.
//!
//! - `controller`: controller-level settings loaded from environment variables

mod controller;

pub use controller::{ControllerConfig, LogFormat};
