//! Event routing for the notification dispatcher.
//!
//! - [`EventRouter`]: decode, resolve, filter, then render, deliver and audit
//! - [`templates`]: pure event-to-text rendering
//! - [`RouterConfig`]: notify-worthy statuses, escalation defaults, locale

pub mod config;
pub mod router;
pub mod templates;

pub use config::*;
pub use router::*;
pub use templates::Locale;
