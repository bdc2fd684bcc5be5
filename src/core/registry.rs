use crate::core::bridge::{
    Bridge, BridgeId, BridgeStatus, SerialBridge, TcpLoopback, TcpSerialGateway,
};
use crate::core::relay::RelaySettings;
use crate::domain::error::HubResult;
use crate::domain::port::PortConfig;
use crate::infrastructure::trace::TraceSink;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// What to build when creating a bridge.
#[derive(Debug, Clone)]
pub enum BridgeSpec {
    /// Splice two serial devices together
    Serial { first: PortConfig, second: PortConfig },
    /// TCP fan-out on a loopback-only listener
    Loopback { port: u16 },
    /// Gateway one serial device onto an any-interface TCP listener
    TcpSerial { serial: PortConfig, tcp_port: u16 },
}

/// Owns every active bridge for the lifetime of the hub.
///
/// Ids are allocated in strictly increasing order starting at 1 and are
/// never reused, including ids consumed by bridges that failed to start.
/// The active set is mutated and iterated under one lock, so a status
/// snapshot never observes a half-added or half-removed bridge.
pub struct BridgeRegistry {
    bridges: Mutex<BTreeMap<BridgeId, Box<dyn Bridge>>>,
    next_id: AtomicU64,
    trace: Arc<TraceSink>,
    settings: RelaySettings,
}

impl BridgeRegistry {
    pub fn new(trace: Arc<TraceSink>, settings: RelaySettings) -> Self {
        Self {
            bridges: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            trace,
            settings,
        }
    }

    /// Construct and start a bridge, returning its id. A start failure
    /// still consumes the id; the bridge is dropped and never tracked.
    pub async fn create(&self, spec: BridgeSpec) -> HubResult<BridgeId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut bridge: Box<dyn Bridge> = match spec {
            BridgeSpec::Serial { first, second } => Box::new(SerialBridge::new(
                id,
                first,
                second,
                Arc::clone(&self.trace),
                self.settings,
            )),
            BridgeSpec::Loopback { port } => Box::new(TcpLoopback::new(
                id,
                port,
                Arc::clone(&self.trace),
                self.settings,
            )),
            BridgeSpec::TcpSerial { serial, tcp_port } => Box::new(TcpSerialGateway::new(
                id,
                serial,
                tcp_port,
                Arc::clone(&self.trace),
                self.settings,
            )),
        };

        bridge.start().await?;
        self.bridges.lock().await.insert(id, bridge);
        Ok(id)
    }

    /// Stop and remove a bridge. Returns false, with the active set
    /// untouched, when the id is unknown.
    pub async fn stop(&self, id: BridgeId) -> bool {
        let bridge = self.bridges.lock().await.remove(&id);
        match bridge {
            Some(mut bridge) => {
                bridge.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop and remove every active bridge.
    pub async fn stop_all(&self) {
        let drained = std::mem::take(&mut *self.bridges.lock().await);
        let count = drained.len();
        for (_, mut bridge) in drained {
            bridge.stop().await;
        }
        if count > 0 {
            info!("Stopped {} bridge(s)", count);
        }
    }

    /// Point-in-time snapshot of every active bridge, in id order.
    pub async fn status(&self) -> Vec<BridgeStatus> {
        let bridges = self.bridges.lock().await;
        let mut statuses = Vec::with_capacity(bridges.len());
        for bridge in bridges.values() {
            statuses.push(bridge.status().await);
        }
        statuses
    }

    pub async fn count(&self) -> usize {
        self.bridges.lock().await.len()
    }
}
