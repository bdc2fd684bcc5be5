// Relay module - the shared read-then-forward primitive
pub mod endpoint;
pub mod pump;

pub use endpoint::ByteEndpoint;
pub use pump::spawn_pump;

use std::time::Duration;

/// Timing knobs shared by every relay loop.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Upper bound on a single blocking read; also the polling interval the
    /// stop flag is observed at.
    pub read_timeout: Duration,
    /// Pause after an unexpected I/O failure before retrying.
    pub backoff: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            backoff: Duration::from_millis(10),
        }
    }
}
