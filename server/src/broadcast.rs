//! Fan-out of server messages to connected sessions

use crate::session::{Session, SessionRegistry};
use log::debug;
use relay_protocol::{ServerMessage, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Sends framed messages to registered sessions
///
/// Delivery failures are per recipient and never propagate: a peer whose
/// connection has died, or who has stopped reading and let its queue fill,
/// simply misses the message, and everyone else still gets it.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends to every session except the sender and `exclude_id`
    ///
    /// Returns how many recipients accepted the message.
    pub fn send(
        &self,
        message: &ServerMessage,
        sender: &Session,
        exclude_id: Option<SessionId>,
    ) -> usize {
        let frame = message.frame();
        let recipients = self.registry.recipients_except(sender, exclude_id);

        recipients
            .iter()
            .filter(|recipient| deliver(recipient, frame.clone()))
            .count()
    }

    /// Sends to a single session, ignoring failure
    pub fn send_to(&self, session: &Session, message: &ServerMessage) -> bool {
        deliver(session, message.frame())
    }
}

fn deliver(session: &Session, frame: String) -> bool {
    match session.deliver(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Dropped message for stalled session {}", session.id());
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Dropped message for closed session {}", session.id());
            false
        }
    }
}
