//! Internal telemetry for the notification dispatcher.
//!
//! Metrics live in-process and are served from the operational HTTP
//! surface; logs go through `tracing`.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
