//! Connection registry for authenticated WebSocket connections
//!
//! This module provides:
//! - `ConnectionHandle`: outbound channel, close and liveness state of one connection
//! - `ConnectionRegistry`: identity -> live connection, last connection wins

mod registry;
mod stats;
mod types;

pub use registry::ConnectionRegistry;
pub use stats::RegistryStats;
pub use types::{ConnectionHandle, DeliveryError};
