//! Server network layer: TCP accept loop and connection task management

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::connection::{admit, write_frames, ConnectionWorker};
use crate::session::SessionRegistry;
use crate::store::PlayerStore;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// How long shutdown waits for connections to flush before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stops a running server and all of its connections
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.signal.send(true);
    }
}

/// Relay server accepting TCP clients
pub struct Server {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    store: Arc<dyn PlayerStore>,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Binds the listening socket described by `config`
    pub async fn bind(
        config: ServerConfig,
        store: Arc<dyn PlayerStore>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(SessionRegistry::new());

        Ok(Server {
            listener,
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            store,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Actual bound address, useful when binding to port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accepts connections until shut down, then waits for every connection
    /// to finish its teardown and flush its last frames
    pub async fn run(self) {
        let mut connections = JoinSet::new();
        let mut shutdown = self.shutdown_rx.clone();

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(&mut connections, stream, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },

                Some(joined) = connections.join_next() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                },

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        info!(
            "Server shutting down, closing {} connection(s)",
            connections.len()
        );

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Aborting {} connection(s) that did not close in time",
                connections.len()
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
    }

    fn spawn_connection(
        &self,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        addr: SocketAddr,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.queue_capacity());

        let session = admit(&self.registry, &self.broadcaster, addr, outbound_tx);
        let id = session.id();
        info!("Client connected from {} -> session {}", addr, id);

        let worker = ConnectionWorker::new(
            session,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            &self.config,
        );
        let shutdown = self.shutdown_rx.clone();

        // The writer ends once the worker has dropped the last handle to the
        // session, after its exit announcement has been queued.
        connections.spawn(async move {
            let reading = async {
                if let Err(e) = worker.run(read_half, shutdown).await {
                    warn!("Session {} closed with error: {}", id, e);
                }
            };
            tokio::join!(reading, write_frames(write_half, outbound_rx));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPlayerStore;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        line
    }

    #[tokio::test]
    async fn test_bind_to_ephemeral_port() {
        let server = Server::bind(local_config(), Arc::new(MemoryPlayerStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn test_accept_assigns_id_and_registers() {
        let server = Server::bind(local_config(), Arc::new(MemoryPlayerStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut client).await, "0:ID:0\n");
        assert_eq!(registry.ids(), vec![0]);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(registry.is_empty());
    }

    async fn read_until_eof(reader: &mut BufReader<TcpStream>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = read_line(reader).await;
            if line.is_empty() {
                return lines;
            }
            lines.push(line);
        }
    }

    #[tokio::test]
    async fn test_accept_announces_to_existing_clients() {
        let server = Server::bind(local_config(), Arc::new(MemoryPlayerStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        let mut a = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut a).await, "0:ID:0\n");
        let mut b = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut b).await, "1:ID:1\n");
        assert_eq!(read_line(&mut a).await, "1:ENTER\n");

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_exit_frames() {
        let server = Server::bind(local_config(), Arc::new(MemoryPlayerStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        let mut a = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut a).await, "0:ID:0\n");
        let mut b = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut b).await, "1:ID:1\n");
        assert_eq!(read_line(&mut a).await, "1:ENTER\n");

        shutdown.trigger();
        handle.await.unwrap();

        // Whichever session departs first is announced to the other one,
        // and both streams end cleanly
        let mut remaining = read_until_eof(&mut a).await;
        remaining.extend(read_until_eof(&mut b).await);
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0] == "0:EXIT\n" || remaining[0] == "1:EXIT\n");
    }

    #[tokio::test]
    async fn test_shutdown_closes_client_connections() {
        let server = Server::bind(local_config(), Arc::new(MemoryPlayerStore::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(read_line(&mut client).await, "0:ID:0\n");

        shutdown.trigger();
        handle.await.unwrap();

        // The server side shuts its write half down, so the client sees EOF
        assert_eq!(read_line(&mut client).await, "");
    }
}
