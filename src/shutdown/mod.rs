//! Graceful shutdown handling for the relay.
//!
//! Once the HTTP listener has stopped accepting upgrades:
//! 1. Every live connection is closed with a going-away frame
//! 2. Sessions tear down and remove their registry entries
//! 3. The caller closes the database pool afterwards

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::close_code;
use tokio::time::timeout;

use crate::connection_manager::ConnectionRegistry;
use crate::websocket::close_reason;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for sessions to leave the registry (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Registry polling interval while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_config(registry, ShutdownConfig::default())
    }

    pub fn with_config(registry: Arc<ConnectionRegistry>, config: ShutdownConfig) -> Self {
        Self { registry, config }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.len())
    )]
    pub async fn execute(&self) -> ShutdownResult {
        let start = std::time::Instant::now();
        let initial = self.registry.len();

        tracing::info!("Closing live connections");
        let connections_closed = self
            .registry
            .close_all(close_code::AWAY, close_reason::SHUTTING_DOWN);

        let remaining = self.wait_for_registry_to_drain().await;

        let result = ShutdownResult {
            success: remaining == 0,
            connections_closed,
            connections_drained: initial.saturating_sub(remaining),
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_closed = result.connections_closed,
            connections_drained = result.connections_drained,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Returns how many entries are still registered when the wait ends.
    async fn wait_for_registry_to_drain(&self) -> usize {
        let wait = async {
            while !self.registry.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait).await;

        let remaining = self.registry.len();
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }
        remaining
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether the registry emptied before the drain timeout
    pub success: bool,
    /// Connections sent a going-away close
    pub connections_closed: usize,
    /// Connections that left the registry while draining
    pub connections_drained: usize,
    pub duration: Duration,
}
