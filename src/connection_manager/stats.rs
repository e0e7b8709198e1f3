//! Registry statistics

use serde::Serialize;

/// Snapshot of the connection registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    /// Identities with a live connection, sorted
    pub users: Vec<String>,
}
