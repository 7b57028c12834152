//! # confsync Server
//!
//! Push registry and request handling for the configuration authority.
//!
//! This crate provides:
//! - [`PushRegistry`]: live client registrations and push fan-out
//! - [`PushSink`]: per-connection delivery capability
//! - [`PushOnApply`]: lifecycle observer that pushes applied configuration
//! - [`ConfigServer`]: the context object tying store, lifecycle and registry
//!   together for one process
//!
//! # Delivery model
//!
//! Pushes are fire-and-forget and at-most-once per connection. A failed
//! delivery is logged and counted in the returned [`PushReport`]; it is never
//! retried here. Clients poll independently and converge on the next tick.
//!
//! # Staleness
//!
//! A registration is live while its last heartbeat is younger than
//! [`ServerConfig::heartbeat_timeout`]. Staleness is evaluated when the
//! registry is read; nothing sweeps in the background.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bridge;
mod config;
mod directory;
mod error;
mod handler;
mod registry;
mod server;
mod sink;

pub use bridge::PushOnApply;
pub use config::ServerConfig;
pub use directory::{EntityDirectory, MemoryDirectory};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, HttpReply, RequestHandler};
pub use registry::{ClientRegistration, ConnectionId, ConnectionStats, PushRegistry, PushReport};
pub use server::ConfigServer;
pub use sink::{ChannelSink, DeliveryError, PushSink};
