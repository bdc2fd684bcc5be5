use crate::core::bridge::{Bridge, BridgeId, BridgeKind, BridgeState, BridgeStatus};
use crate::core::relay::{ByteEndpoint, RelaySettings};
use crate::domain::error::{HubError, HubResult};
use crate::domain::port::PortConfig;
use crate::infrastructure::serial::open_endpoint;
use crate::infrastructure::trace::TraceSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CLIENT_BUFFER_SIZE: usize = 4096;
const IDLE_PAUSE: Duration = Duration::from_millis(10);

type ClientSet = Arc<Mutex<HashMap<u64, OwnedWriteHalf>>>;
type SharedWriter = Arc<Mutex<Box<dyn ByteEndpoint>>>;

/// One serial endpoint gatewayed onto an any-interface TCP listener.
///
/// Inbound bytes from each TCP client go to the serial device under a mutex
/// exclusive to the device, so chunks from different clients never
/// interleave mid-write. Outbound bytes are read by a single dedicated task
/// on its own port handle (no writer lock taken) and broadcast best-effort
/// to every connected client.
pub struct TcpSerialGateway {
    id: BridgeId,
    serial_config: PortConfig,
    tcp_port: u16,
    state: BridgeState,
    active: Arc<AtomicBool>,
    rx_bytes: Arc<AtomicU64>,
    tx_bytes: Arc<AtomicU64>,
    clients: ClientSet,
    next_client_id: Arc<AtomicU64>,
    serial_writer: Option<SharedWriter>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<mpsc::Sender<()>>,
    accept_handle: Option<JoinHandle<()>>,
    serial_handle: Option<JoinHandle<()>>,
    trace: Arc<TraceSink>,
    settings: RelaySettings,
}

impl TcpSerialGateway {
    pub fn new(
        id: BridgeId,
        serial_config: PortConfig,
        tcp_port: u16,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            id,
            serial_config,
            tcp_port,
            state: BridgeState::Created,
            active: Arc::new(AtomicBool::new(false)),
            rx_bytes: Arc::new(AtomicU64::new(0)),
            tx_bytes: Arc::new(AtomicU64::new(0)),
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_client_id: Arc::new(AtomicU64::new(1)),
            serial_writer: None,
            local_addr: None,
            shutdown: None,
            accept_handle: None,
            serial_handle: None,
            trace,
            settings,
        }
    }

    /// Address the listener actually bound, available once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Bind the listener and spawn all relay tasks over already-opened
    /// serial halves. Split out of `start` so tests can inject endpoints.
    async fn start_with_serial(
        &mut self,
        serial_reader: Box<dyn ByteEndpoint>,
        serial_writer: Box<dyn ByteEndpoint>,
    ) -> HubResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.tcp_port))
            .await
            .map_err(|e| HubError::PortUnavailable {
                message: format!("TCP port {}: {}", self.tcp_port, e),
            })?;
        self.local_addr = listener.local_addr().ok();

        let serial_writer: SharedWriter = Arc::new(Mutex::new(serial_writer));
        self.serial_writer = Some(Arc::clone(&serial_writer));

        self.active.store(true, Ordering::Relaxed);
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);
        self.shutdown = Some(shutdown_sender);

        self.accept_handle = Some(tokio::spawn(Self::accept_loop(
            listener,
            shutdown_receiver,
            serial_writer,
            Arc::clone(&self.clients),
            Arc::clone(&self.next_client_id),
            Arc::clone(&self.rx_bytes),
            Arc::clone(&self.active),
            Arc::clone(&self.trace),
            self.settings,
        )));
        self.serial_handle = Some(tokio::spawn(Self::serial_read_loop(
            serial_reader,
            self.serial_config.name.clone(),
            Arc::clone(&self.clients),
            Arc::clone(&self.tx_bytes),
            Arc::clone(&self.active),
            Arc::clone(&self.trace),
            self.settings,
        )));

        self.state = BridgeState::Running;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn accept_loop(
        listener: TcpListener,
        mut shutdown: mpsc::Receiver<()>,
        serial_writer: SharedWriter,
        clients: ClientSet,
        next_client_id: Arc<AtomicU64>,
        rx_bytes: Arc<AtomicU64>,
        active: Arc<AtomicBool>,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let client_id = next_client_id.fetch_add(1, Ordering::Relaxed);
                            info!("Gateway client {} connected from {}", client_id, addr);

                            let (read_half, write_half) = stream.into_split();
                            clients.lock().await.insert(client_id, write_half);

                            tokio::spawn(Self::client_loop(
                                read_half,
                                client_id,
                                Arc::clone(&serial_writer),
                                Arc::clone(&clients),
                                Arc::clone(&rx_bytes),
                                Arc::clone(&active),
                                Arc::clone(&trace),
                                settings,
                            ));
                        }
                        Err(e) => {
                            error!("Gateway accept failed: {}", e);
                            tokio::time::sleep(settings.backoff).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Gateway accept loop shutting down");
                    break;
                }
            }
        }
    }

    /// Inbound direction: one TCP client feeding the serial device.
    #[allow(clippy::too_many_arguments)]
    async fn client_loop(
        mut reader: OwnedReadHalf,
        client_id: u64,
        serial_writer: SharedWriter,
        clients: ClientSet,
        rx_bytes: Arc<AtomicU64>,
        active: Arc<AtomicBool>,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) {
        let mut buf = vec![0u8; CLIENT_BUFFER_SIZE];
        let rx_label = format!("client{} rx", client_id);

        while active.load(Ordering::Relaxed) {
            match timeout(settings.read_timeout, reader.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    trace.emit(&rx_label, &buf[..n]);
                    rx_bytes.fetch_add(n as u64, Ordering::Relaxed);

                    // One chunk per lock acquisition: concurrent clients
                    // never interleave bytes within each other's chunks.
                    let mut writer = serial_writer.lock().await;
                    if let Err(e) = writer.write_chunk(&buf[..n]) {
                        warn!("Gateway serial write failed: {}", e);
                        tokio::time::sleep(settings.backoff).await;
                    }
                }
                Ok(Err(e)) => {
                    debug!("Gateway client {} read failed: {}", client_id, e);
                    break;
                }
            }
        }

        clients.lock().await.remove(&client_id);
        info!("Gateway client {} disconnected", client_id);
    }

    /// Outbound direction: the single serial reader broadcasting to all
    /// connected clients.
    async fn serial_read_loop(
        mut reader: Box<dyn ByteEndpoint>,
        label: String,
        clients: ClientSet,
        tx_bytes: Arc<AtomicU64>,
        active: Arc<AtomicBool>,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) {
        let mut buf = vec![0u8; CLIENT_BUFFER_SIZE];

        while active.load(Ordering::Relaxed) {
            match reader.read_chunk(&mut buf) {
                Ok(0) => {
                    tokio::time::sleep(IDLE_PAUSE).await;
                }
                Ok(n) => {
                    trace.emit(&label, &buf[..n]);
                    tx_bytes.fetch_add(n as u64, Ordering::Relaxed);

                    let mut clients = clients.lock().await;
                    for (client_id, writer) in clients.iter_mut() {
                        match writer.write_all(&buf[..n]).await {
                            Ok(()) => {
                                trace.emit(&format!("client{} tx", client_id), &buf[..n]);
                            }
                            Err(e) => {
                                debug!("Gateway write to client {} failed: {}", client_id, e);
                            }
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    tokio::time::sleep(IDLE_PAUSE).await;
                }
                Err(e) => {
                    if active.load(Ordering::Relaxed) {
                        warn!("Gateway serial read failed: {}", e);
                        tokio::time::sleep(settings.backoff).await;
                    }
                }
            }
        }

        debug!("Gateway serial read loop exited");
    }
}

#[async_trait]
impl Bridge for TcpSerialGateway {
    async fn start(&mut self) -> HubResult<()> {
        if self.state != BridgeState::Created {
            return Err(HubError::Bridge {
                message: format!("Bridge #{} cannot be restarted", self.id),
            });
        }

        // Serial first: a dead device must fail before the listener binds.
        let (serial_reader, serial_writer) =
            open_endpoint(&self.serial_config, self.settings.read_timeout)?;
        self.start_with_serial(serial_reader, serial_writer).await?;

        info!(
            "Bridge #{}: {} <-> TCP:{} running",
            self.id,
            self.serial_config.name,
            self.local_addr.map(|a| a.port()).unwrap_or(self.tcp_port),
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if self.state == BridgeState::Running {
            self.active.store(false, Ordering::Relaxed);

            if let Some(shutdown) = self.shutdown.take() {
                let _ = shutdown.send(()).await;
            }
            if let Some(handle) = self.accept_handle.take() {
                if let Err(e) = handle.await {
                    warn!("Bridge #{} accept task failed: {}", self.id, e);
                }
            }
            if let Some(handle) = self.serial_handle.take() {
                if let Err(e) = handle.await {
                    warn!("Bridge #{} serial task failed: {}", self.id, e);
                }
            }

            self.clients.lock().await.clear();
            // Last handle on the write side of the port.
            self.serial_writer = None;
            info!("Bridge #{} stopped", self.id);
        }
        self.state = BridgeState::Stopped;
    }

    async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            id: self.id,
            kind: BridgeKind::TcpSerial,
            endpoints: format!(
                "{} <-> TCP:{}",
                self.serial_config.name,
                self.local_addr.map(|a| a.port()).unwrap_or(self.tcp_port)
            ),
            state: self.state,
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            client_count: Some(self.client_count().await),
        }
    }
}
