//! Broker connection management for the notification dispatcher.
//!
//! [`BrokerConnectionManager`] owns the session lifecycle: it declares the
//! topology, feeds one message at a time to a [`MessageHandler`], settles
//! each delivery from the handler's [`Disposition`](dispatch_core::Disposition),
//! and reconnects with jittered exponential backoff when the session drops.
//! The transport sits behind [`BrokerConnector`]; [`amqp`] is the `lapin`
//! implementation used in production.

pub mod amqp;
pub mod backoff;
pub mod config;
pub mod manager;
pub mod session;
pub mod topology;

pub use amqp::AmqpConnector;
pub use config::*;
pub use manager::*;
pub use session::*;
pub use topology::*;
