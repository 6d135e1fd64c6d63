//! Wakegate - A wake-on-connect gateway for a sleeping game server
//!
//! This library provides a TCP gateway that:
//! - Probes the backend game server and tracks whether it is reachable
//! - Relays connections transparently while the backend is up
//! - Answers server-list pings and rejects joins itself while the backend is down
//! - Asks the hosting panel to start the backend on the first join of a down-period

pub mod boot;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod healthcheck;
pub mod offline;
pub mod proxy;
pub mod state;
pub mod wake;

/// Version information for the gateway
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
