// Bridge module - the three relay topologies behind one trait
pub mod gateway;
pub mod loopback;
pub mod serial;

pub use gateway::TcpSerialGateway;
pub use loopback::TcpLoopback;
pub use serial::SerialBridge;

use crate::domain::error::HubResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Process-unique bridge identifier, assigned in strictly increasing order
/// starting at 1 and never reused.
pub type BridgeId = u64;

/// Which relay topology a bridge implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    /// Two serial endpoints spliced together
    Serial,
    /// N TCP clients on a loopback-only listener, each fanned out to the others
    Loopback,
    /// One serial endpoint fanned out to N TCP clients
    TcpSerial,
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeKind::Serial => write!(f, "serial"),
            BridgeKind::Loopback => write!(f, "loopback"),
            BridgeKind::TcpSerial => write!(f, "tcpserial"),
        }
    }
}

/// Bridge lifecycle. Created bridges may start once; stopped bridges stay
/// stopped, a new bridge (and new id) is required to resume relaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Created => write!(f, "created"),
            BridgeState::Running => write!(f, "running"),
            BridgeState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time snapshot of one bridge.
///
/// Byte counters are best-effort diagnostics: monotonically non-decreasing,
/// exact only once traffic has quiesced on a single-writer path.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub id: BridgeId,
    pub kind: BridgeKind,
    pub endpoints: String,
    pub state: BridgeState,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// Connected TCP clients; `None` for bridge kinds without a client set.
    pub client_count: Option<usize>,
}

/// One configured relay topology. Implementations spawn their relay tasks on
/// `start` and wind them down on `stop`.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Open endpoints and spawn the relay tasks. Fails without side effects
    /// when an endpoint cannot be opened; fails if the bridge already ran.
    async fn start(&mut self) -> HubResult<()>;

    /// Wind down all relay tasks and release the endpoints. Safe to call
    /// more than once.
    async fn stop(&mut self);

    /// Snapshot of the bridge's identity, state and counters.
    async fn status(&self) -> BridgeStatus;
}
