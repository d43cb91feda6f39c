//! Remote side of FieldSync: the HTTP gateway the sync engine pushes to and
//! a reachability probe for hosts without a platform network monitor.

pub mod client;
pub mod error;
pub mod network;

pub use client::{HttpRemoteGateway, DEFAULT_TIMEOUT_SECS};
pub use error::{RemoteError, Result};
pub use network::{HttpReachabilityMonitor, DEFAULT_PROBE_TIMEOUT_SECS};
