//! Connection dispatcher
//!
//! Accepts client connections and routes each one by the backend health bit
//! read at accept time: straight through to the backend when it is reachable,
//! to the offline responder when it is not.

use crate::offline::OfflineResponder;
use crate::state::GatewayState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// The gateway's front listener
pub struct GatewayServer {
    listener: TcpListener,
    backend_addr: String,
    state: Arc<GatewayState>,
    responder: Arc<OfflineResponder>,
    dial_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
    next_conn_id: AtomicU64,
}

impl GatewayServer {
    /// Bind the listener. Port 0 picks a free port, see [`local_addr`](Self::local_addr).
    pub async fn bind(
        bind_addr: &str,
        backend_addr: impl Into<String>,
        state: Arc<GatewayState>,
        responder: Arc<OfflineResponder>,
        dial_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to listen on {}: {}", bind_addr, e))?;

        Ok(Self {
            listener,
            backend_addr: backend_addr.into(),
            state,
            responder,
            dial_timeout,
            shutdown_rx,
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.listener.local_addr()?;
        info!(addr = %addr, backend = %self.backend_addr, "Gateway listening");

        let mut shutdown_rx = self.shutdown_rx.clone();
        let backend_addr: Arc<str> = Arc::from(self.backend_addr.as_str());

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            let reachable = self.state.is_reachable();

                            if reachable {
                                let backend_addr = Arc::clone(&backend_addr);
                                let dial_timeout = self.dial_timeout;
                                tokio::spawn(async move {
                                    relay(stream, peer, conn_id, &backend_addr, dial_timeout).await;
                                });
                            } else {
                                let responder = Arc::clone(&self.responder);
                                tokio::spawn(async move {
                                    let outcome = responder.handle(stream, peer).await;
                                    debug!(
                                        conn_id,
                                        peer = %peer,
                                        outcome = ?outcome,
                                        "Offline connection finished"
                                    );
                                });
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Gateway shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Pipe a client through to the backend until either side closes
async fn relay(
    client: TcpStream,
    peer: SocketAddr,
    conn_id: u64,
    backend_addr: &str,
    dial_timeout: Duration,
) {
    let dial = TcpStream::connect(backend_addr);
    let backend = match tokio::time::timeout(dial_timeout, dial).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(
                conn_id,
                peer = %peer,
                backend = backend_addr,
                error = %e,
                "Failed to connect to backend"
            );
            return;
        }
        Err(_) => {
            warn!(conn_id, peer = %peer, backend = backend_addr, "Timed out connecting to backend");
            return;
        }
    };

    debug!(conn_id, peer = %peer, "New connection being relayed");
    forward_bidirectional(client, backend, conn_id).await;
}

/// Forward bytes bidirectionally between client and backend connections
async fn forward_bidirectional(mut client: TcpStream, mut backend: TcpStream, conn_id: u64) {
    let _ = client.set_nodelay(true);
    let _ = backend.set_nodelay(true);

    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((client_to_backend, backend_to_client)) => {
            debug!(
                conn_id,
                client_to_backend,
                backend_to_client,
                "Relay closed normally"
            );
        }
        Err(e) => {
            debug!(conn_id, error = %e, "Relay closed with error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::BootGate;
    use crate::config::OfflineConfig;
    use crate::error::WakeError;
    use crate::frame::DEFAULT_MAX_FRAME_LEN;
    use crate::handshake::Handshake;
    use crate::wake::WakeApi;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct NoopWake;

    impl WakeApi for NoopWake {
        fn start_server(&self) -> BoxFuture<'_, Result<(), WakeError>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Echo backend that counts accepted connections
    async fn echo_backend() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let (mut r, mut w) = stream.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });

        (addr, accepted)
    }

    async fn start_gateway(
        state: Arc<GatewayState>,
        backend_addr: &str,
    ) -> (SocketAddr, watch::Sender<bool>) {
        let gate = Arc::new(BootGate::new(state.clone(), Arc::new(NoopWake)));
        let responder = Arc::new(OfflineResponder::new(
            &OfflineConfig::default(),
            gate,
            Duration::from_secs(2),
            DEFAULT_MAX_FRAME_LEN,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = GatewayServer::bind(
            "127.0.0.1:0",
            backend_addr,
            state,
            responder,
            Duration::from_secs(1),
            shutdown_rx,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (addr, shutdown_tx)
    }

    #[tokio::test]
    async fn test_reachable_backend_is_relayed() {
        let (backend_addr, accepted) = echo_backend().await;
        let state = GatewayState::new();
        state.record_probe(true);
        let (addr, _shutdown) = start_gateway(state, &backend_addr).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Not valid protocol traffic: passthrough must not inspect it
        client.write_all(b"\xFF\xFF\xFF\xFF\xFF\xFFraw bytes").await.unwrap();
        let mut buf = [0u8; 15];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\xFF\xFF\xFF\xFF\xFF\xFFraw bytes");
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_never_dialed() {
        let (backend_addr, accepted) = echo_backend().await;
        let state = GatewayState::new();
        let (addr, _shutdown) = start_gateway(state, &backend_addr).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let handshake = Handshake {
            protocol_version: 765,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: 1,
        };
        client.write_all(&handshake.to_frame().encode()).await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();

        assert!(!reply.is_empty());
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_backend_dial_closes_client() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let state = GatewayState::new();
        state.record_probe(true);
        let (addr, _shutdown) = start_gateway(state, &dead_addr).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut buf))
            .await
            .expect("client should be closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let state = GatewayState::new();
        let gate = Arc::new(BootGate::new(state.clone(), Arc::new(NoopWake)));
        let responder = Arc::new(OfflineResponder::new(
            &OfflineConfig::default(),
            gate,
            Duration::from_secs(1),
            DEFAULT_MAX_FRAME_LEN,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = GatewayServer::bind(
            "127.0.0.1:0",
            "127.0.0.1:1",
            state,
            responder,
            Duration::from_secs(1),
            shutdown_rx,
        )
        .await
        .unwrap();
        let handle = tokio::spawn(server.run());

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
