//! Session tracking and identifier assignment for the relay server
//!
//! This module owns the only shared mutable state in the server:
//! - Assignment of session identifiers from a monotonic counter
//! - The ordered set of live sessions used for routing
//! - Consistent snapshots of recipients for broadcast fan-out
//!
//! Every mutation happens under one mutex, and the lock is never held while
//! writing to a socket or calling into the player store. Writers receive a
//! cloned list of sessions instead.

use relay_protocol::{PositionPayload, ServerMessage, SessionId};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Bounded queue of framed messages consumed by a session's writer task
pub type Outbound = mpsc::Sender<String>;

/// One live client connection
///
/// Sessions are written to by enqueueing frames on their outbound queue; the
/// connection's writer task drains the queue onto the socket. Once that task
/// is gone (write failure, peer reset) every delivery attempt fails, and a
/// peer that stops reading fails deliveries once its queue is full.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    addr: SocketAddr,
    outbound: Outbound,
    last_known_position: Mutex<Option<PositionPayload>>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            addr,
            outbound,
            last_known_position: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues an already framed message for this session's transport
    ///
    /// Never waits: a full queue rejects the frame.
    pub fn deliver(&self, frame: String) -> Result<(), TrySendError<String>> {
        self.outbound.try_send(frame)
    }

    /// True once the writer side of the connection has shut down
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    pub fn set_position(&self, position: PositionPayload) {
        *self
            .last_known_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(position);
    }

    pub fn position(&self) -> Option<PositionPayload> {
        *self
            .last_known_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: BTreeMap<SessionId, Arc<Session>>,
    next_id: SessionId,
}

/// Thread-safe registry of active sessions
///
/// A session is present exactly while its connection worker is running its
/// receive loop. Identifier assignment and insertion happen as one step under
/// the registry lock, so concurrent accepts can never observe or produce a
/// partially registered session, and identifiers are never reused.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation leaves the state consistent before releasing the lock,
    // so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates the next identifier and registers a new session
    ///
    /// The `<id>:ID:<id>` greeting is queued before the session becomes
    /// visible to broadcasts, so it is always the first frame the client
    /// receives.
    pub fn register(&self, addr: SocketAddr, outbound: Outbound) -> Arc<Session> {
        let mut state = self.lock();

        let id = state.next_id;
        state.next_id += 1;

        let session = Arc::new(Session::new(id, addr, outbound));
        let _ = session.deliver(ServerMessage::Assigned(id).frame());
        state.sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Removes a session from the registry
    ///
    /// Matches by identity, not just by identifier. Returns false if the
    /// session was already gone, which makes double disconnects harmless.
    pub fn deregister(&self, session: &Session) -> bool {
        let mut state = self.lock();

        match state.sessions.entry(session.id()) {
            Entry::Occupied(entry) if std::ptr::eq(Arc::as_ptr(entry.get()), session) => {
                entry.remove();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of broadcast recipients, in identifier order
    ///
    /// Excludes the sender and, if given, one additional session id. The list
    /// is copied under the lock so callers can write to the recipients without
    /// holding it.
    pub fn recipients_except(
        &self,
        sender: &Session,
        exclude_id: Option<SessionId>,
    ) -> Vec<Arc<Session>> {
        self.lock()
            .sessions
            .values()
            .filter(|session| !std::ptr::eq(Arc::as_ptr(session), sender))
            .filter(|session| Some(session.id()) != exclude_id)
            .cloned()
            .collect()
    }

    /// Looks up a live session by identifier
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().sessions.get(&id).cloned()
    }

    /// Identifiers of all live sessions, ascending
    pub fn ids(&self) -> Vec<SessionId> {
        self.lock().sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}
