//! Outgoing message queue
//!
//! Protocol logic never touches the socket. It pushes typed messages into an
//! unbounded channel drained by whatever owns the connection.

use tokio::sync::mpsc;
use tracing::debug;

use crate::messages::ClientMessage;

/// Sending half of the outgoing message queue
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<ClientMessage>,
}

impl Outbox {
    /// Create an outbox and the receiver the connection task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue a message, returning whether the connection side is still alive
    ///
    /// A closed queue means the connection is gone; the coordinator learns
    /// about that through `on_disconnected`, so the failure is only logged.
    pub fn send(&self, msg: ClientMessage) -> bool {
        let msg_type = msg.message_type();
        match self.sender.send(msg) {
            Ok(()) => true,
            Err(_) => {
                debug!(msg_type, "Dropping outgoing message, connection closed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
