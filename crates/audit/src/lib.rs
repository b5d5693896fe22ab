//! Audit trail for the notification dispatcher.
//!
//! Every event that reaches the delivery decision point leaves exactly one
//! [`NotificationAttempt`](dispatch_core::NotificationAttempt) behind.
//! [`AuditLogger`] never lets a storage failure reach the caller; the
//! ClickHouse store is the production [`AuditSink`].

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod schema;
pub mod sink;

pub use client::*;
pub use config::*;
pub use insert::ClickHouseAuditStore;
pub use sink::*;
