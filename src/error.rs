use crate::config::ParseConfigError;
use crate::events::EventStreamError;
use crate::protocol::status::{CloseCode, RequestStatus};

/// Errors surfaced by a session or by one of its request futures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket-level failure: connect, TLS, abnormal close.
    #[error("websocket transport error")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The handshake did not reach the identified state. Terminal.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Config(#[from] ParseConfigError),

    /// The server answered this request with a non-success status.
    /// Other in-flight requests are unaffected.
    #[error("request failed with status {code:?}")]
    RequestFailed {
        code: RequestStatus,
        comment: Option<String>,
    },

    /// The response arrived but its data did not match the expected
    /// shape.
    #[error("could not decode response data")]
    ResponseDecode(#[source] serde_json::Error),

    /// A batch outcome was taken as a different request type than it
    /// was submitted with.
    #[error("batch response taken as the wrong type")]
    ResponseTypeMismatch,

    /// The operation was submitted on a session that is not identified.
    #[error("session is not connected")]
    NotConnected,

    /// The session went away before the operation completed.
    #[error("session disconnected ({0:?})")]
    Disconnected(Option<CloseCode>),

    #[error(transparent)]
    EventStream(#[from] EventStreamError),

    /// Outgoing payload could not be serialized.
    #[error("could not encode request data")]
    Encode(#[source] serde_json::Error),
}

/// Terminal failures while driving Hello → Identify → Identified.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("server requires authentication but no password was supplied")]
    MissingPassword,

    /// Server closed with code 4009.
    #[error("authentication rejected by server")]
    AuthenticationFailed,

    /// Server closed with code 4010.
    #[error("server does not support rpc version {0}")]
    UnsupportedRpcVersion(u32),

    #[error("unexpected message during handshake: {0}")]
    ProtocolViolation(String),

    #[error("connection closed during handshake ({0:?})")]
    ConnectionClosed(Option<CloseCode>),
}
