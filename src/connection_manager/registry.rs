use std::sync::Arc;

use axum::extract::ws::close_code;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::stats::RegistryStats;
use super::types::ConnectionHandle;
use crate::metrics::AdmissionMetrics;
use crate::websocket::close_reason;

/// Maps each authenticated identity to its single live connection.
///
/// A new registration for an identity replaces and closes the previous one
/// (last connection wins). Removal on disconnect is guarded by connection id
/// so a stale session cannot remove its replacement.
pub struct ConnectionRegistry {
    /// user_id -> ConnectionHandle
    connections: DashMap<String, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection under its identity, closing any connection it replaces.
    pub fn put(&self, handle: Arc<ConnectionHandle>) {
        let user_id = handle.user_id.clone();

        match self.connections.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(handle.clone());
                if previous.id != handle.id {
                    // Closed while the shard is still locked, so no reader sees both
                    previous.close(close_code::AWAY, close_reason::SUPERSEDED);
                    AdmissionMetrics::record_eviction();
                    tracing::info!(
                        user_id = %handle.user_id,
                        evicted_connection_id = %previous.id,
                        connection_id = %handle.id,
                        "Previous connection superseded"
                    );
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
            }
        }

        AdmissionMetrics::set_active(self.connections.len());
        tracing::info!(connection_id = %handle.id, user_id = %handle.user_id, "Connection registered");
    }

    /// Current live connection for an identity.
    pub fn get(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(user_id).map(|h| h.clone())
    }

    /// Remove whatever connection is registered for the identity.
    pub fn delete(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.remove(user_id).map(|(_, handle)| handle);
        AdmissionMetrics::set_active(self.connections.len());
        removed
    }

    /// Remove the identity's entry only if it still points at `connection_id`.
    pub fn delete_if_owned(&self, user_id: &str, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(user_id, |_, handle| handle.id == connection_id)
            .is_some();

        if removed {
            AdmissionMetrics::set_active(self.connections.len());
            tracing::info!(connection_id = %connection_id, user_id = %user_id, "Connection unregistered");
        }
        removed
    }

    /// Close a connection and drop it from the registry if it is still the registered one.
    pub fn evict(&self, handle: &ConnectionHandle, code: u16, reason: &str) -> bool {
        handle.close(code, reason);
        self.delete_if_owned(&handle.user_id, handle.id)
    }

    /// Close every registered connection. Entries are removed by their sessions.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let handles = self.all_connections();
        let mut closed = 0;
        for handle in &handles {
            if handle.close(code, reason) {
                closed += 1;
            }
        }
        closed
    }

    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut users: Vec<String> = self.connections.iter().map(|r| r.key().clone()).collect();
        users.sort();

        RegistryStats {
            total_connections: users.len(),
            users,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
