//! CLI command implementations.

pub mod cache;
pub mod diff;
pub mod version;
