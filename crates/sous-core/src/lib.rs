//! Shared domain model and wire protocol for the sous collaboration hub.
//!
//! The daemon and any client (including the test client) depend on this crate
//! so that session snapshots, commands, and events are the same types on both
//! ends of the wire.

pub mod protocol;
pub mod session;
