use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, Message};
use tokio::time::MissedTickBehavior;

use crate::config::RelayConfig;
use crate::connection_manager::ConnectionHandle;
use crate::metrics::HeartbeatMetrics;
use crate::websocket::close_reason;

/// Lower bound on the probe period; `tokio::time::interval` rejects zero
const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Per-connection liveness prober.
///
/// Sends a ping every `interval`. The matching pongs are seen by the read
/// loop, which extends the connection's read deadline; the monitor itself only
/// fails the connection when a probe cannot be queued in time.
pub struct HeartbeatMonitor {
    handle: Arc<ConnectionHandle>,
    interval: Duration,
    send_timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(handle: Arc<ConnectionHandle>, config: &RelayConfig) -> Self {
        Self {
            handle,
            interval: config.heartbeat_interval.max(MIN_PROBE_INTERVAL),
            send_timeout: config.send_timeout,
        }
    }

    /// Run until the connection closes or a probe fails.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.handle.closed() => break,
                _ = ticker.tick() => {
                    match self
                        .handle
                        .send(Message::Ping(Default::default()), self.send_timeout)
                        .await
                    {
                        Ok(()) => HeartbeatMetrics::record_probe(),
                        Err(e) => {
                            tracing::warn!(
                                connection_id = %self.handle.id,
                                user_id = %self.handle.user_id,
                                error = %e,
                                "Heartbeat probe failed"
                            );
                            HeartbeatMetrics::record_probe_failure();
                            self.handle
                                .close(close_code::AWAY, close_reason::HEARTBEAT_FAILED);
                            break;
                        }
                    }
                }
            }
        }

        tracing::debug!(connection_id = %self.handle.id, "Heartbeat monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn config(interval_ms: u64) -> RelayConfig {
        RelayConfig {
            heartbeat_interval: Duration::from_millis(interval_ms),
            send_timeout: Duration::from_millis(10),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sends_pings_on_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new("alice".to_string(), tx));
        let task = tokio::spawn(HeartbeatMonitor::new(handle.clone(), &config(10)).run());

        for _ in 0..2 {
            let frame = tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .unwrap();
            assert!(matches!(frame, Some(Message::Ping(_))));
        }

        handle.close(close_code::NORMAL, "");
        tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_connection_is_closed() {
        // Capacity 1 and nobody reading: the second probe cannot be queued
        let (tx, _rx) = mpsc::channel(1);
        let handle = Arc::new(ConnectionHandle::new("alice".to_string(), tx));
        let task = tokio::spawn(HeartbeatMonitor::new(handle.clone(), &config(10)).run());

        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_zero_interval_still_probes() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new("alice".to_string(), tx));
        let config = RelayConfig {
            heartbeat_interval: Duration::ZERO,
            ..config(10)
        };
        let task = tokio::spawn(HeartbeatMonitor::new(handle.clone(), &config).run());

        let frame = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Message::Ping(_))));

        handle.close(close_code::NORMAL, "");
        tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_connection_closes() {
        let (tx, _rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new("alice".to_string(), tx));
        let task = tokio::spawn(HeartbeatMonitor::new(handle.clone(), &config(60_000)).run());

        handle.close(close_code::NORMAL, "");
        tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .unwrap()
            .unwrap();
    }
}
