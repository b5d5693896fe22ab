//! Core types for the notification dispatcher.
//!
//! Domain events as they arrive from the broker, channel resolution,
//! notification attempt records, and the shared error taxonomy.

pub mod attempt;
pub mod channel;
pub mod disposition;
pub mod error;
pub mod events;

pub use attempt::*;
pub use channel::*;
pub use disposition::*;
pub use error::{Error, ErrorKind, Result};
pub use events::*;
