//! Operational HTTP surface for the notification dispatcher.
//!
//! Health, liveness and readiness probes, in-process metrics, and the
//! circuit breaker override. Events never enter through HTTP.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
