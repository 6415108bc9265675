// Per-connection outbound queue shared between the hub and a writer task.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

pub type ConnectionId = u64;

/// One encoded line waiting to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Serialized JSON including the trailing `\n`.
    pub line: String,
    /// Stop the whole server once this frame has been written.
    pub shutdown_after: bool,
}

/// Sending side of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbox: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { id, outbox }
    }

    /// A handle plus the receiving end its writer drains.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Queue `message` as one line. Returns `false` once the writer is gone.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        self.send_frame(message, false)
    }

    /// Queue `message` and ask the writer to stop the server after it.
    pub fn send_final<T: Serialize>(&self, message: &T) -> bool {
        self.send_frame(message, true)
    }

    fn send_frame<T: Serialize>(&self, message: &T, shutdown_after: bool) -> bool {
        let Some(line) = encode_line(message) else {
            return !self.is_closed();
        };
        self.outbox.send(OutboundFrame { line, shutdown_after }).is_ok()
    }
}

/// Serialize `message` as a newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(mut line) => {
            line.push('\n');
            Some(line)
        }
        Err(error) => {
            warn!(%error, "failed to encode outbound message");
            None
        }
    }
}
