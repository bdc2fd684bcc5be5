use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// One byte-level transfer event: who moved data, and what it looked like.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// Logical stream the bytes came from or went to, e.g. `COM5` or `client2 rx`.
    pub label: String,
    /// Space-separated two-digit uppercase hex.
    pub hex: String,
    /// Printable ASCII (32..=126) as-is, everything else rendered as `.`.
    pub ascii: String,
}

impl TraceRecord {
    pub fn new(label: &str, data: &[u8]) -> Self {
        let hex = data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii = data
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
            .collect();
        Self {
            label: label.to_string(),
            hex,
            ascii,
        }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}  |{}|", self.label, self.hex, self.ascii)
    }
}

/// Runtime-togglable diagnostic channel for transfer events.
///
/// Pumps call [`TraceSink::emit`] on every successful transfer; when tracing
/// is disabled that is a single atomic load and nothing is rendered. Records
/// are published over an unbounded channel, which serializes them without
/// imposing any ordering between distinct logical streams. The enabled flag
/// uses relaxed ordering: toggles only need eventual visibility to pumps.
pub struct TraceSink {
    enabled: AtomicBool,
    sender: mpsc::UnboundedSender<TraceRecord>,
}

impl TraceSink {
    /// Create a sink and the receiving end the presentation layer drains.
    pub fn new(enabled: bool) -> (Self, mpsc::UnboundedReceiver<TraceRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                enabled: AtomicBool::new(enabled),
                sender,
            },
            receiver,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        debug!("Trace sink {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Flip the enabled flag, returning the new state.
    pub fn toggle(&self) -> bool {
        // fetch_xor(true) flips and returns the previous value.
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }

    /// Record a transfer. No-op (and no rendering work) while disabled.
    pub fn emit(&self, label: &str, data: &[u8]) {
        if !self.is_enabled() {
            return;
        }
        // The receiver may already be gone during shutdown; drop the record.
        let _ = self.sender.send(TraceRecord::new(label, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rendering() {
        let record = TraceRecord::new("P1", &[0x41, 0x42, 0x0A]);
        assert_eq!(record.hex, "41 42 0A");
        assert_eq!(record.ascii, "AB.");
        assert_eq!(record.to_string(), "[P1] 41 42 0A  |AB.|");
    }

    #[test]
    fn test_printable_range_boundaries() {
        let record = TraceRecord::new("edge", &[31, 32, 126, 127]);
        assert_eq!(record.ascii, ". ~.");
    }

    #[tokio::test]
    async fn test_disabled_sink_emits_nothing() {
        let (sink, mut receiver) = TraceSink::new(false);
        sink.emit("quiet", b"data");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_enabled_sink_delivers_records() {
        let (sink, mut receiver) = TraceSink::new(false);
        assert!(sink.toggle());
        sink.emit("P1", &[0x50]);
        let record = receiver.recv().await.unwrap();
        assert_eq!(record.label, "P1");
        assert_eq!(record.hex, "50");

        assert!(!sink.toggle());
        sink.emit("P1", &[0x51]);
        assert!(receiver.try_recv().is_err());
    }
}
