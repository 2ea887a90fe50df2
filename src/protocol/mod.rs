//! Wire protocol for obs-websocket 5.x.
//!
//! Every frame is a JSON text message of the form `{"op": <int>, "d":
//! <object>}`. The opcode selects the payload shape; payloads are split
//! by direction into [`to_server`] and [`to_client`].

pub mod status;
pub mod subscription;
pub mod to_client;
pub mod to_server;

/// Protocol revision this client implements and requests at handshake.
pub const RPC_VERSION: u32 = 1;

/// Opcode of the outer envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Reidentify = 3,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
    RequestBatch = 8,
    RequestBatchResponse = 9,
}

impl Opcode {
    pub fn from_repr(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Hello),
            1 => Some(Self::Identify),
            2 => Some(Self::Identified),
            3 => Some(Self::Reidentify),
            5 => Some(Self::Event),
            6 => Some(Self::Request),
            7 => Some(Self::RequestResponse),
            8 => Some(Self::RequestBatch),
            9 => Some(Self::RequestBatchResponse),
            _ => None,
        }
    }
}

/// Failure to map an incoming frame to a typed payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope is missing its `{0}` field")]
    MissingField(&'static str),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u64),
    #[error("opcode {0:?} is not valid server-to-client")]
    UnexpectedOpcode(Opcode),
    #[error("payload for {opcode:?} does not match: {source}")]
    Payload {
        opcode: Opcode,
        #[source]
        source: serde_json::Error,
    },
}
