//! Drives the identification exchange that opens every session.

use tokio::sync::mpsc;
use tracing::debug;

use crate::auth;
use crate::config::ConnectConfig;
use crate::drivers::{DriverEvent, DriverHandle};
use crate::error::HandshakeError;
use crate::protocol::status::CloseCode;
use crate::protocol::to_client::{Identified, ServerMessage};
use crate::protocol::to_server::{ClientMessage, Identify};
use crate::protocol::RPC_VERSION;

/// Waits for `Hello`, answers with `Identify` (computing the challenge
/// response when the server demands one), and waits for `Identified`.
/// Any other message in between is a protocol violation.
pub(crate) async fn identify(
    driver: &DriverHandle,
    incoming: &mut mpsc::Receiver<DriverEvent>,
    config: &ConnectConfig,
) -> Result<Identified, HandshakeError> {
    let hello = match next(incoming).await? {
        ServerMessage::Hello(hello) => hello,
        other => return Err(violation(&other)),
    };

    debug!(
        "hello: server={} rpc={} auth_required={}",
        hello.obs_web_socket_version,
        hello.rpc_version,
        hello.authentication.is_some()
    );

    // A password with no challenge is fine; a challenge with no
    // password is not.
    let authentication = match (&hello.authentication, &config.password) {
        (Some(auth), Some(password)) => Some(auth::authentication_string(
            password,
            &auth.challenge,
            &auth.salt,
        )),
        (Some(_), None) => return Err(HandshakeError::MissingPassword),
        (None, _) => None,
    };

    driver
        .send(ClientMessage::Identify(Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: Some(config.subscriptions),
        }))
        .await
        .map_err(|_| HandshakeError::ConnectionClosed(None))?;

    match next(incoming).await? {
        ServerMessage::Identified(identified) => {
            debug!("identified: negotiated rpc {}", identified.negotiated_rpc_version);
            Ok(identified)
        }
        other => Err(violation(&other)),
    }
}

async fn next(incoming: &mut mpsc::Receiver<DriverEvent>) -> Result<ServerMessage, HandshakeError> {
    match incoming.recv().await {
        Some(DriverEvent::Message(msg)) => Ok(msg),
        Some(DriverEvent::Closed(code)) => Err(close_error(code)),
        None => Err(HandshakeError::ConnectionClosed(None)),
    }
}

fn close_error(code: Option<CloseCode>) -> HandshakeError {
    match code {
        Some(CloseCode::AuthenticationFailed) => HandshakeError::AuthenticationFailed,
        Some(CloseCode::UnsupportedRpcVersion) => HandshakeError::UnsupportedRpcVersion(RPC_VERSION),
        code => HandshakeError::ConnectionClosed(code),
    }
}

fn violation(msg: &ServerMessage) -> HandshakeError {
    HandshakeError::ProtocolViolation(format!(
        "{:?} before identification completed",
        msg.opcode()
    ))
}
