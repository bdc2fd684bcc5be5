use crate::core::relay::{ByteEndpoint, RelaySettings};
use crate::infrastructure::trace::TraceSink;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RELAY_BUFFER_SIZE: usize = 4096;

/// Idle pause when the source reports zero bytes without blocking.
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// Spawn one direction of a relay: read available bytes from `source`,
/// trace them under `label`, forward them to `sink` and bump `counter`.
///
/// Read timeouts are the normal idle case and loop straight back. Other I/O
/// failures pause for `settings.backoff` and retry while `active` holds.
/// The loop exits once `active` is cleared, observed at worst one read
/// timeout plus one backoff later; the endpoints close when the task drops
/// them on the way out.
pub fn spawn_pump(
    label: String,
    mut source: Box<dyn ByteEndpoint>,
    mut sink: Box<dyn ByteEndpoint>,
    counter: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    trace: Arc<TraceSink>,
    settings: RelaySettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

        while active.load(Ordering::Relaxed) {
            match source.read_chunk(&mut buf) {
                Ok(0) => {
                    tokio::time::sleep(IDLE_PAUSE).await;
                }
                Ok(n) => {
                    trace.emit(&label, &buf[..n]);
                    match sink.write_chunk(&buf[..n]) {
                        Ok(()) => {
                            counter.fetch_add(n as u64, Ordering::Relaxed);
                        }
                        Err(e) => {
                            if active.load(Ordering::Relaxed) {
                                warn!("Relay '{}' write failed: {}", label, e);
                                tokio::time::sleep(settings.backoff).await;
                            }
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // Idle poll; gives the stop flag a chance to be seen.
                    tokio::time::sleep(IDLE_PAUSE).await;
                }
                Err(e) => {
                    if active.load(Ordering::Relaxed) {
                        warn!("Relay '{}' read failed: {}", label, e);
                        tokio::time::sleep(settings.backoff).await;
                    }
                }
            }
        }

        debug!("Relay '{}' exited", label);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::endpoint::mock::mock_endpoint;

    fn test_settings() -> RelaySettings {
        RelaySettings {
            read_timeout: Duration::from_millis(10),
            backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_pump_forwards_bytes_in_order() {
        let (source, source_handle) = mock_endpoint();
        let (sink, sink_handle) = mock_endpoint();
        let counter = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        let (trace, _records) = TraceSink::new(false);

        let payload: Vec<u8> = (0..100u8).collect();
        source_handle.feed(&payload);

        let handle = spawn_pump(
            "p1".to_string(),
            Box::new(source),
            Box::new(sink),
            Arc::clone(&counter),
            Arc::clone(&active),
            Arc::new(trace),
            test_settings(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        active.store(false, Ordering::Relaxed);
        handle.await.unwrap();

        assert_eq!(sink_handle.written_bytes(), payload);
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[tokio::test]
    async fn test_pump_traces_forwarded_chunks() {
        let (source, source_handle) = mock_endpoint();
        let (sink, _sink_handle) = mock_endpoint();
        let counter = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        let (trace, mut records) = TraceSink::new(true);

        source_handle.feed(&[0x41, 0x42, 0x0A]);

        let handle = spawn_pump(
            "P1".to_string(),
            Box::new(source),
            Box::new(sink),
            counter,
            Arc::clone(&active),
            Arc::new(trace),
            test_settings(),
        );

        let record = records.recv().await.unwrap();
        assert_eq!(record.to_string(), "[P1] 41 42 0A  |AB.|");

        active.store(false, Ordering::Relaxed);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_survives_write_failures() {
        let (source, source_handle) = mock_endpoint();
        let (sink, sink_handle) = mock_endpoint();
        let counter = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        let (trace, _records) = TraceSink::new(false);

        sink_handle.set_fail_writes(true);
        source_handle.feed(b"lost");

        let handle = spawn_pump(
            "p1".to_string(),
            Box::new(source),
            Box::new(sink),
            Arc::clone(&counter),
            Arc::clone(&active),
            Arc::new(trace),
            test_settings(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Failed writes are not counted; the loop keeps going.
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        sink_handle.set_fail_writes(false);
        source_handle.feed(b"ok");
        tokio::time::sleep(Duration::from_millis(100)).await;

        active.store(false, Ordering::Relaxed);
        handle.await.unwrap();

        assert_eq!(sink_handle.written_bytes(), b"ok");
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_pump_stops_within_timeout_bound() {
        let (source, _source_handle) = mock_endpoint();
        let (sink, _sink_handle) = mock_endpoint();
        let counter = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        let (trace, _records) = TraceSink::new(false);

        let handle = spawn_pump(
            "p1".to_string(),
            Box::new(source),
            Box::new(sink),
            counter,
            Arc::clone(&active),
            Arc::new(trace),
            test_settings(),
        );

        active.store(false, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("pump did not stop in time")
            .unwrap();
    }
}
