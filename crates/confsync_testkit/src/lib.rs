//! # confsync Testkit
//!
//! Test utilities for confsync.
//!
//! This crate provides:
//! - An in-process server fixture with loopback pull and push transports
//! - Test doubles for transports, sleepers and bind targets
//! - Property-based test generators using proptest
//! - A concurrent stress runner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use confsync_testkit::prelude::*;
//!
//! #[test]
//! fn client_sees_published_values() {
//!     let server = TestServer::new();
//!     server.publish(&[("a", "1")]);
//!     let engine = server.client_engine(server.client_config());
//!     engine.initialize();
//!     assert_eq!(engine.get("a", None).as_deref(), Some("1"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod loopback;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
    pub use crate::stress::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
pub use stress::*;
