//! Outbound calls made by the notification dispatcher.
//!
//! - [`CircuitBreaker`]: three-state guard shared by every call to one dependency
//! - [`HttpDeliveryGateway`]: `POST /send` with retries, behind a breaker
//! - [`TenantConfigResolver`]: per-tenant escalation recipient lookup

pub mod circuit_breaker;
pub mod config;
pub mod delivery;
pub mod tenant;

pub use circuit_breaker::*;
pub use config::*;
pub use delivery::*;
pub use tenant::*;
