//! Per-connection receive loop and command dispatch
//!
//! Every accepted connection is first [`admit`]ted: registered (which queues
//! `<id>:ID:<id>` for the session itself) and announced to the sessions that
//! were already connected with `<id>:ENTER`. It then runs one
//! [`ConnectionWorker`] for its read half and [`write_frames`] for its write
//! half. The worker:
//! - reads and frames incoming messages, in receive order
//! - persists saves, relays positions and generic text, and replies to the sender
//! - on any exit path, deregisters the session and announces `<id>:EXIT`

use crate::broadcast::Broadcaster;
use crate::config::{FramingMode, ServerConfig};
use crate::session::{Outbound, Session, SessionRegistry};
use crate::store::PlayerStore;
use log::{debug, error, info, warn};
use relay_protocol::framing::decode_text;
use relay_protocol::{
    decode_position, decode_save, Command, FrameTooLong, LineFramer, ServerMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

/// Fatal conditions for a single connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol violation: {0}")]
    FrameTooLong(#[from] FrameTooLong),
}

/// Registers a freshly accepted connection and announces it
///
/// Must run on the accept path, before the next connection is admitted, so
/// `<id>:ENTER` reaches exactly the sessions that were connected first.
pub fn admit(
    registry: &SessionRegistry,
    broadcaster: &Broadcaster,
    addr: SocketAddr,
    outbound: Outbound,
) -> Arc<Session> {
    let session = registry.register(addr, outbound);
    broadcaster.send(&ServerMessage::Entered(session.id()), &session, None);
    session
}

/// Drives one client connection from its first read to teardown
pub struct ConnectionWorker {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    store: Arc<dyn PlayerStore>,
    framing: FramingMode,
    read_buffer: usize,
    max_frame_len: usize,
}

impl ConnectionWorker {
    /// Creates a worker for a session that has already been admitted
    pub fn new(
        session: Arc<Session>,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn PlayerStore>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            session,
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            store,
            framing: config.framing,
            read_buffer: config.read_buffer.max(1),
            max_frame_len: config.max_frame_len,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Runs the connection until EOF, a transport error, or shutdown
    ///
    /// Teardown (deregistration and the exit announcement) happens however
    /// this future ends, including when it is dropped before completion.
    pub async fn run<R>(
        self,
        reader: R,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let _departure = Departure {
            registry: &self.registry,
            broadcaster: &self.broadcaster,
            session: &self.session,
        };

        self.receive_loop(reader, shutdown).await
    }

    async fn receive_loop<R>(
        &self,
        mut reader: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; self.read_buffer];
        let mut framer = LineFramer::new(self.max_frame_len);

        loop {
            if *shutdown.borrow() {
                debug!("Session {} stopping for shutdown", self.session.id());
                return Ok(());
            }

            let read = tokio::select! {
                read = reader.read(&mut buffer) => read?,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
            };

            if read == 0 {
                if let Some(rest) = framer.finish() {
                    self.handle_message(&rest).await;
                }
                return Ok(());
            }

            match self.framing {
                FramingMode::Raw => {
                    if let Some(message) = decode_text(&buffer[..read]) {
                        self.handle_message(&message).await;
                    }
                }
                FramingMode::Line => {
                    for message in framer.push(&buffer[..read]) {
                        self.handle_message(&message).await;
                    }
                    framer.check_limit()?;
                }
            }
        }
    }

    /// Dispatches one complete client message
    pub async fn handle_message(&self, message: &str) {
        debug!("Received from session {}: {}", self.session.id(), message);

        match Command::parse(message) {
            Command::Save { payload } => self.handle_save(payload).await,
            Command::Position { payload } => self.handle_position(payload),
            Command::Relay { text } => self.relay(text),
        }
    }

    // Saves are answered to the sender only and never broadcast
    async fn handle_save(&self, payload: &str) {
        let Some(save) = decode_save(payload) else {
            warn!(
                "Session {} sent an unparseable save: {}",
                self.session.id(),
                payload
            );
            self.reply(ServerMessage::SaveParseError);
            return;
        };

        let store = Arc::clone(&self.store);
        let player_id = self.session.id();
        let outcome = tokio::task::spawn_blocking(move || store.upsert(player_id, &save)).await;

        let reply = match outcome {
            Ok(Ok(())) => ServerMessage::SaveOk,
            Ok(Err(e)) => {
                error!("Save for session {} failed: {}", player_id, e);
                ServerMessage::SaveFail
            }
            Err(e) => {
                error!("Save task for session {} panicked: {}", player_id, e);
                ServerMessage::SaveFail
            }
        };
        self.reply(reply);
    }

    fn handle_position(&self, payload: &str) {
        let Some(position) = decode_position(payload) else {
            warn!(
                "Session {} sent an unparseable position: {}",
                self.session.id(),
                payload
            );
            self.reply(ServerMessage::PositionParseError);
            return;
        };

        self.session.set_position(position);
        let relayed = ServerMessage::Position {
            from: self.session.id(),
            x: position.x,
            y: position.y,
            z: position.z,
        };
        self.broadcaster.send(&relayed, &self.session, None);
        self.reply(ServerMessage::PositionOk);
    }

    fn relay(&self, text: &str) {
        let relayed = ServerMessage::Relay {
            from: self.session.id(),
            text: text.to_string(),
        };
        self.broadcaster.send(&relayed, &self.session, None);
    }

    fn reply(&self, message: ServerMessage) {
        self.broadcaster.send_to(&self.session, &message);
    }
}

/// Removes the session and tells the others it left, on every exit path
struct Departure<'a> {
    registry: &'a SessionRegistry,
    broadcaster: &'a Broadcaster,
    session: &'a Session,
}

impl Drop for Departure<'_> {
    fn drop(&mut self) {
        let id = self.session.id();
        if self.registry.deregister(self.session) {
            self.broadcaster
                .send(&ServerMessage::Exited(id), self.session, None);
            info!("Session {} ({}) disconnected", id, self.session.addr());
        }
    }
}

/// Drains a session's outbound queue onto its transport
///
/// Ends when every sender for the queue is gone or a write fails. In both
/// cases the transport is shut down; after a failure the queue is closed, so
/// further deliveries to the session are rejected.
pub async fn write_frames<W>(mut writer: W, mut outbound: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            warn!("Write failed, closing transport: {}", e);
            break;
        }
    }
    outbound.close();
    let _ = writer.shutdown().await;
}
