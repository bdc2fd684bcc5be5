use crate::core::bridge::{Bridge, BridgeId, BridgeKind, BridgeState, BridgeStatus};
use crate::core::relay::RelaySettings;
use crate::domain::error::{HubError, HubResult};
use crate::infrastructure::trace::TraceSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CLIENT_BUFFER_SIZE: usize = 4096;

type ClientSet = Arc<Mutex<HashMap<u64, OwnedWriteHalf>>>;

/// N-to-N TCP fan-out on a loopback-only listener.
///
/// Every byte a client sends is forwarded to every *other* connected client,
/// never echoed back to the sender. Membership in the client set is the sole
/// source of truth for who receives broadcasts; a client leaves the set when
/// its own read loop observes EOF or a read failure.
pub struct TcpLoopback {
    id: BridgeId,
    port: u16,
    state: BridgeState,
    active: Arc<AtomicBool>,
    rx_bytes: Arc<AtomicU64>,
    tx_bytes: Arc<AtomicU64>,
    clients: ClientSet,
    next_client_id: Arc<AtomicU64>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<mpsc::Sender<()>>,
    accept_handle: Option<JoinHandle<()>>,
    trace: Arc<TraceSink>,
    settings: RelaySettings,
}

impl TcpLoopback {
    pub fn new(id: BridgeId, port: u16, trace: Arc<TraceSink>, settings: RelaySettings) -> Self {
        Self {
            id,
            port,
            state: BridgeState::Created,
            active: Arc::new(AtomicBool::new(false)),
            rx_bytes: Arc::new(AtomicU64::new(0)),
            tx_bytes: Arc::new(AtomicU64::new(0)),
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_client_id: Arc::new(AtomicU64::new(1)),
            local_addr: None,
            shutdown: None,
            accept_handle: None,
            trace,
            settings,
        }
    }

    /// Address the listener actually bound, available once running. Useful
    /// when the bridge was created with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    #[allow(clippy::too_many_arguments)]
    async fn accept_loop(
        listener: TcpListener,
        mut shutdown: mpsc::Receiver<()>,
        clients: ClientSet,
        next_client_id: Arc<AtomicU64>,
        rx_bytes: Arc<AtomicU64>,
        tx_bytes: Arc<AtomicU64>,
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
                            info!("Loopback client {} connected from {}", client_id, addr);

                            let (read_half, write_half) = stream.into_split();
                            clients.lock().await.insert(client_id, write_half);

                            tokio::spawn(Self::client_loop(
                                read_half,
                                client_id,
                                Arc::clone(&clients),
                                Arc::clone(&rx_bytes),
                                Arc::clone(&tx_bytes),
                                Arc::clone(&active),
                                Arc::clone(&trace),
                                settings,
                            ));
                        }
                        Err(e) => {
                            error!("Loopback accept failed: {}", e);
                            tokio::time::sleep(settings.backoff).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Loopback accept loop shutting down");
                    break;
                }
            }
        }
    }

    /// Read loop for one client: forward everything it sends to every other
    /// client. EOF or a read failure is terminal for this client only.
    #[allow(clippy::too_many_arguments)]
    async fn client_loop(
        mut reader: OwnedReadHalf,
        client_id: u64,
        clients: ClientSet,
        rx_bytes: Arc<AtomicU64>,
        tx_bytes: Arc<AtomicU64>,
        active: Arc<AtomicBool>,
        trace: Arc<TraceSink>,
        settings: RelaySettings,
    ) {
        let mut buf = vec![0u8; CLIENT_BUFFER_SIZE];
        let rx_label = format!("client{} rx", client_id);

        while active.load(Ordering::Relaxed) {
            match timeout(settings.read_timeout, reader.read(&mut buf)).await {
                // Timeout: normal polling outcome, re-check the stop flag.
                Err(_) => continue,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    trace.emit(&rx_label, &buf[..n]);
                    rx_bytes.fetch_add(n as u64, Ordering::Relaxed);

                    // The set lock is held for the whole fan-out so a
                    // concurrent add/remove never sees a half-delivered
                    // broadcast.
                    let mut clients = clients.lock().await;
                    for (peer_id, writer) in clients.iter_mut() {
                        if *peer_id == client_id {
                            continue;
                        }
                        match writer.write_all(&buf[..n]).await {
                            Ok(()) => {
                                trace.emit(&format!("client{} tx", peer_id), &buf[..n]);
                                tx_bytes.fetch_add(n as u64, Ordering::Relaxed);
                            }
                            Err(e) => {
                                // Isolated: the peer's own read loop will
                                // notice the broken socket and clean up.
                                debug!("Loopback write to client {} failed: {}", peer_id, e);
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    debug!("Loopback client {} read failed: {}", client_id, e);
                    break;
                }
            }
        }

        clients.lock().await.remove(&client_id);
        info!("Loopback client {} disconnected", client_id);
    }
}

#[async_trait]
impl Bridge for TcpLoopback {
    async fn start(&mut self) -> HubResult<()> {
        if self.state != BridgeState::Created {
            return Err(HubError::Bridge {
                message: format!("Bridge #{} cannot be restarted", self.id),
            });
        }

        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| HubError::PortUnavailable {
                message: format!("TCP port {}: {}", self.port, e),
            })?;
        self.local_addr = listener.local_addr().ok();

        self.active.store(true, Ordering::Relaxed);
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);
        self.shutdown = Some(shutdown_sender);
        self.accept_handle = Some(tokio::spawn(Self::accept_loop(
            listener,
            shutdown_receiver,
            Arc::clone(&self.clients),
            Arc::clone(&self.next_client_id),
            Arc::clone(&self.rx_bytes),
            Arc::clone(&self.tx_bytes),
            Arc::clone(&self.active),
            Arc::clone(&self.trace),
            self.settings,
        )));

        self.state = BridgeState::Running;
        info!(
            "Bridge #{}: loopback on {} running",
            self.id,
            self.local_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| format!("127.0.0.1:{}", self.port)),
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

            // Dropping the write halves closes the sockets; the client read
            // loops observe the stop flag within one read timeout.
            self.clients.lock().await.clear();
            info!("Bridge #{} stopped", self.id);
        }
        self.state = BridgeState::Stopped;
    }

    async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            id: self.id,
            kind: BridgeKind::Loopback,
            endpoints: format!(
                "TCP:{}",
                self.local_addr.map(|a| a.port()).unwrap_or(self.port)
            ),
            state: self.state,
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            client_count: Some(self.client_count().await),
        }
    }
}
