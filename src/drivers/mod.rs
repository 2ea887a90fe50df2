//! Transport drivers. A driver owns the socket, decodes inbound frames
//! at the edge, and bridges them to the session over bounded channels.

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

use crate::error::Error;
use crate::protocol::status::CloseCode;
use crate::protocol::to_client::ServerMessage;
use crate::protocol::to_server::ClientMessage;

pub mod ws;

/// Inbound item from a driver: a decoded frame, or the close
/// notification that ends the stream.
#[derive(Debug)]
pub enum DriverEvent {
    Message(ServerMessage),
    /// The socket closed. Codes in the protocol's 4000 range map to
    /// [`CloseCode`]; anything else arrives as `None`.
    Closed(Option<CloseCode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStopReason {
    UserAborted,
    ServerDisconnect,
    ServerError,
}

#[derive(Debug)]
pub struct DriverHandle {
    abort_handle: AbortHandle,
    sender: mpsc::Sender<ClientMessage>,
}

impl DriverHandle {
    pub fn new(sender: mpsc::Sender<ClientMessage>, abort_handle: AbortHandle) -> Self {
        Self {
            abort_handle,
            sender,
        }
    }

    /// Queues a frame for transmission. Frames go out in submission
    /// order.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), Error> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Disconnected(None))
    }

    pub fn disconnect(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        debug!("driver handle dropped, aborting task");
        self.disconnect();
    }
}

pub type DriverConnection = (
    DriverHandle,
    mpsc::Receiver<DriverEvent>,
    JoinHandle<DriverStopReason>,
);
