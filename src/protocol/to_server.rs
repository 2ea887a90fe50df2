use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use super::status::RequestBatchExecutionType;
use super::subscription::EventSubscription;
use super::Opcode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<EventSubscription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reidentify {
    /// Absent means every non-high-volume category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<EventSubscription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequestElement {
    pub request_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<JsonValue>,
}

/// The batch id travels as `requestId` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBatch {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_on_failure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_type: Option<RequestBatchExecutionType>,
    pub requests: Vec<BatchRequestElement>,
}

#[derive(Debug, Clone)]
pub enum ClientMessage {
    Identify(Identify),
    Reidentify(Reidentify),
    Request(Request),
    RequestBatch(RequestBatch),
}

impl ClientMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            ClientMessage::Identify(_) => Opcode::Identify,
            ClientMessage::Reidentify(_) => Opcode::Reidentify,
            ClientMessage::Request(_) => Opcode::Request,
            ClientMessage::RequestBatch(_) => Opcode::RequestBatch,
        }
    }

    /// Wraps the payload in the `{op, d}` envelope as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let d = match self {
            ClientMessage::Identify(payload) => serde_json::to_value(payload)?,
            ClientMessage::Reidentify(payload) => serde_json::to_value(payload)?,
            ClientMessage::Request(payload) => serde_json::to_value(payload)?,
            ClientMessage::RequestBatch(payload) => serde_json::to_value(payload)?,
        };

        serde_json::to_string(&json!({ "op": self.opcode() as u8, "d": d }))
    }
}
