use std::io;

/// A readable/writable byte stream with timeout-bounded reads.
///
/// Implementations back this with a real serial port handle; tests use the
/// in-memory mock below. `read_chunk` must return within the configured read
/// timeout, reporting an idle interval as `ErrorKind::TimedOut` so relay
/// loops can poll their stop flag between attempts.
pub trait ByteEndpoint: Send {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_chunk(&mut self, data: &[u8]) -> io::Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::ByteEndpoint;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory endpoint: reads drain a shared inbound buffer (empty reads
    /// as `TimedOut`), writes are captured with their chunk boundaries.
    pub struct MockPort {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    /// Test-side handle to a [`MockPort`]'s buffers.
    #[derive(Clone)]
    pub struct MockHandle {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    pub fn mock_endpoint() -> (MockPort, MockHandle) {
        let inbound = Arc::new(Mutex::new(VecDeque::new()));
        let written = Arc::new(Mutex::new(Vec::new()));
        let fail_writes = Arc::new(Mutex::new(false));
        (
            MockPort {
                inbound: Arc::clone(&inbound),
                written: Arc::clone(&written),
                fail_writes: Arc::clone(&fail_writes),
            },
            MockHandle {
                inbound,
                written,
                fail_writes,
            },
        )
    }

    impl MockHandle {
        pub fn feed(&self, data: &[u8]) {
            self.inbound.lock().unwrap().extend(data.iter().copied());
        }

        /// Written chunks, boundaries preserved.
        pub fn chunks(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }

        pub fn written_bytes(&self) -> Vec<u8> {
            self.chunks().concat()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            *self.fail_writes.lock().unwrap() = fail;
        }
    }

    impl ByteEndpoint for MockPort {
        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inbound = self.inbound.lock().unwrap();
            if inbound.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
            if *self.fail_writes.lock().unwrap() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
            }
            self.written.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }
}
