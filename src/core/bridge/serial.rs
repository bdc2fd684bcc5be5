use crate::core::bridge::{Bridge, BridgeId, BridgeKind, BridgeState, BridgeStatus};
use crate::core::relay::{spawn_pump, ByteEndpoint, RelaySettings};
use crate::domain::error::{HubError, HubResult};
use crate::domain::port::PortConfig;
use crate::infrastructure::serial::open_endpoint;
use crate::infrastructure::trace::TraceSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Splices two serial devices together with one pump per direction.
///
/// Bytes flowing first→second accumulate into `rx_bytes`, the reverse
/// direction into `tx_bytes`. Both devices are opened before anything is
/// spawned, so an open failure leaves no task behind.
pub struct SerialBridge {
    id: BridgeId,
    first: PortConfig,
    second: PortConfig,
    state: BridgeState,
    active: Arc<AtomicBool>,
    rx_bytes: Arc<AtomicU64>,
    tx_bytes: Arc<AtomicU64>,
    pumps: Vec<JoinHandle<()>>,
    trace: Arc<TraceSink>,
    settings: RelaySettings,
}

impl SerialBridge {
    pub fn new(
        id: BridgeId,
        first: PortConfig,
        second: PortConfig,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            id,
            first,
            second,
            state: BridgeState::Created,
            active: Arc::new(AtomicBool::new(false)),
            rx_bytes: Arc::new(AtomicU64::new(0)),
            tx_bytes: Arc::new(AtomicU64::new(0)),
            pumps: Vec::new(),
            trace,
            settings,
        }
    }

    /// Wire the two directional pumps over already-opened endpoint halves.
    fn spawn_relays(
        &mut self,
        first_halves: (Box<dyn ByteEndpoint>, Box<dyn ByteEndpoint>),
        second_halves: (Box<dyn ByteEndpoint>, Box<dyn ByteEndpoint>),
    ) {
        let (first_reader, first_writer) = first_halves;
        let (second_reader, second_writer) = second_halves;

        self.active.store(true, Ordering::Relaxed);
        self.pumps.push(spawn_pump(
            self.first.name.clone(),
            first_reader,
            second_writer,
            Arc::clone(&self.rx_bytes),
            Arc::clone(&self.active),
            Arc::clone(&self.trace),
            self.settings,
        ));
        self.pumps.push(spawn_pump(
            self.second.name.clone(),
            second_reader,
            first_writer,
            Arc::clone(&self.tx_bytes),
            Arc::clone(&self.active),
            Arc::clone(&self.trace),
            self.settings,
        ));
        self.state = BridgeState::Running;
    }
}

#[async_trait]
impl Bridge for SerialBridge {
    async fn start(&mut self) -> HubResult<()> {
        if self.state != BridgeState::Created {
            return Err(HubError::Bridge {
                message: format!("Bridge #{} cannot be restarted", self.id),
            });
        }

        let first_halves = open_endpoint(&self.first, self.settings.read_timeout)?;
        let second_halves = open_endpoint(&self.second, self.settings.read_timeout)?;

        self.spawn_relays(first_halves, second_halves);
        info!(
            "Bridge #{}: {} <-> {} running",
            self.id, self.first.name, self.second.name
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if self.state == BridgeState::Running {
            self.active.store(false, Ordering::Relaxed);
            for pump in self.pumps.drain(..) {
                if let Err(e) = pump.await {
                    warn!("Bridge #{} relay task failed: {}", self.id, e);
                }
            }
            info!("Bridge #{} stopped", self.id);
        }
        self.state = BridgeState::Stopped;
    }

    async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            id: self.id,
            kind: BridgeKind::Serial,
            endpoints: format!("{} <-> {}", self.first.name, self.second.name),
            state: self.state,
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            client_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::endpoint::mock::mock_endpoint;
    use std::time::Duration;

    fn test_bridge() -> SerialBridge {
        let (trace, _records) = TraceSink::new(false);
        SerialBridge::new(
            1,
            PortConfig::new("P1"),
            PortConfig::new("P2"),
            Arc::new(trace),
            RelaySettings {
                read_timeout: Duration::from_millis(10),
                backoff: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn test_relays_bytes_between_endpoints() {
        let mut bridge = test_bridge();

        let (first_reader, first_handle) = mock_endpoint();
        let (first_writer, _) = mock_endpoint();
        let (second_reader, _) = mock_endpoint();
        let (second_writer, second_handle) = mock_endpoint();

        let payload: Vec<u8> = (0..100u8).collect();
        first_handle.feed(&payload);

        bridge.spawn_relays(
            (Box::new(first_reader), Box::new(first_writer)),
            (Box::new(second_reader), Box::new(second_writer)),
        );
        assert_eq!(bridge.status().await.state, BridgeState::Running);

        tokio::time::sleep(Duration::from_millis(100)).await;
        bridge.stop().await;

        assert_eq!(second_handle.written_bytes(), payload);
        let status = bridge.status().await;
        assert_eq!(status.rx_bytes, 100);
        assert_eq!(status.tx_bytes, 0);
        assert_eq!(status.state, BridgeState::Stopped);
    }

    #[tokio::test]
    async fn test_reverse_direction_counts_tx() {
        let mut bridge = test_bridge();

        let (first_reader, _) = mock_endpoint();
        let (first_writer, first_handle) = mock_endpoint();
        let (second_reader, second_handle) = mock_endpoint();
        let (second_writer, _) = mock_endpoint();

        second_handle.feed(b"reply");

        bridge.spawn_relays(
            (Box::new(first_reader), Box::new(first_writer)),
            (Box::new(second_reader), Box::new(second_writer)),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        bridge.stop().await;

        assert_eq!(first_handle.written_bytes(), b"reply");
        assert_eq!(bridge.status().await.tx_bytes, 5);
    }

    #[tokio::test]
    async fn test_open_failure_reports_port_unavailable() {
        let (trace, _records) = TraceSink::new(false);
        let mut bridge = SerialBridge::new(
            1,
            PortConfig::new("/dev/serialhub-missing-a"),
            PortConfig::new("/dev/serialhub-missing-b"),
            Arc::new(trace),
            RelaySettings::default(),
        );

        let result = bridge.start().await;
        assert!(matches!(result, Err(HubError::PortUnavailable { .. })));
        assert_eq!(bridge.status().await.state, BridgeState::Created);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_final() {
        let mut bridge = test_bridge();
        bridge.stop().await;
        bridge.stop().await;
        assert_eq!(bridge.status().await.state, BridgeState::Stopped);

        // A stopped bridge never starts again.
        let result = bridge.start().await;
        assert!(matches!(result, Err(HubError::Bridge { .. })));
    }
}
