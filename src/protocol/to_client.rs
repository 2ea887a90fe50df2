use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::status::RequestStatus;
use super::subscription::EventSubscription;
use super::{DecodeError, Opcode};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuthentication {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    /// Present only when the server requires authentication.
    #[serde(default)]
    pub authentication: Option<HelloAuthentication>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: String,
    pub event_intent: EventSubscription,
    #[serde(default)]
    pub event_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseStatus {
    pub result: bool,
    pub code: RequestStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: ResponseStatus,
    #[serde(default)]
    pub response_data: Option<JsonValue>,
}

/// One entry of a batch response; the id is absent when the matching
/// sub-request carried none.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponseElement {
    pub request_type: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub request_status: ResponseStatus,
    #[serde(default)]
    pub response_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBatchResponse {
    pub request_id: String,
    pub results: Vec<BatchResponseElement>,
}

#[derive(Debug, Clone)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(EventMessage),
    RequestResponse(RequestResponse),
    RequestBatchResponse(RequestBatchResponse),
}

impl ServerMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            ServerMessage::Hello(_) => Opcode::Hello,
            ServerMessage::Identified(_) => Opcode::Identified,
            ServerMessage::Event(_) => Opcode::Event,
            ServerMessage::RequestResponse(_) => Opcode::RequestResponse,
            ServerMessage::RequestBatchResponse(_) => Opcode::RequestBatchResponse,
        }
    }
}

/// Two-step decode: the envelope is first read as a generic value to
/// pick the opcode, then `d` is re-parsed into the concrete payload.
pub fn decode(text: &str) -> Result<ServerMessage, DecodeError> {
    let envelope: JsonValue = serde_json::from_str(text)?;

    let op = envelope
        .get("op")
        .and_then(JsonValue::as_u64)
        .ok_or(DecodeError::MissingField("op"))?;
    let opcode = u8::try_from(op)
        .ok()
        .and_then(Opcode::from_repr)
        .ok_or(DecodeError::UnknownOpcode(op))?;
    let data = envelope
        .get("d")
        .cloned()
        .ok_or(DecodeError::MissingField("d"))?;

    let payload = |source| DecodeError::Payload { opcode, source };

    let msg = match opcode {
        Opcode::Hello => ServerMessage::Hello(serde_json::from_value(data).map_err(payload)?),
        Opcode::Identified => {
            ServerMessage::Identified(serde_json::from_value(data).map_err(payload)?)
        }
        Opcode::Event => ServerMessage::Event(serde_json::from_value(data).map_err(payload)?),
        Opcode::RequestResponse => {
            ServerMessage::RequestResponse(serde_json::from_value(data).map_err(payload)?)
        }
        Opcode::RequestBatchResponse => {
            ServerMessage::RequestBatchResponse(serde_json::from_value(data).map_err(payload)?)
        }
        other => return Err(DecodeError::UnexpectedOpcode(other)),
    };

    Ok(msg)
}
