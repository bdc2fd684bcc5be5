//! SerialHub Library
//!
//! User-mode data-relay hub connecting pairs or groups of byte-stream
//! endpoints - serial devices and TCP sockets - with optional byte-level
//! tracing of every transfer.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::bridge::{Bridge, BridgeId, BridgeKind, BridgeState, BridgeStatus};
pub use crate::core::registry::{BridgeRegistry, BridgeSpec};
pub use crate::core::relay::RelaySettings;
pub use crate::domain::error::{HubError, HubResult};
pub use crate::domain::port::{Parity, PortConfig, StopBits};
pub use crate::infrastructure::config::HubConfig;
pub use crate::infrastructure::trace::{TraceRecord, TraceSink};
