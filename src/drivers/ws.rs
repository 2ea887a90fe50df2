use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::ConnectConfig;
use crate::error::Error;
use crate::protocol::status::CloseCode;
use crate::protocol::to_client;
use crate::protocol::to_server::ClientMessage;

use super::{DriverConnection, DriverEvent, DriverHandle, DriverStopReason};

pub(crate) async fn connect(config: &ConnectConfig) -> Result<DriverConnection, Error> {
    let url = config.url();
    let mut request = url.clone().into_client_request()?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(config.encoding.subprotocol()),
    );

    debug!("connecting to {}", url);
    let (ws, _response) = tokio_tungstenite::connect_async(request).await?;

    let (in_tx, in_rx) = mpsc::channel::<DriverEvent>(32);
    let (out_tx, out_rx) = mpsc::channel(32);

    let task = tokio::spawn(start(ws, in_tx, out_rx));
    let handle = DriverHandle::new(out_tx, task.abort_handle());

    Ok((handle, in_rx, task))
}

async fn start(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    in_tx: mpsc::Sender<DriverEvent>,
    mut out_rx: mpsc::Receiver<ClientMessage>,
) -> DriverStopReason {
    let (mut ws_sink, mut ws_stream) = ws.split();

    loop {
        tokio::select! {
            // Drain the outgoing queue in submission order.
            msg = out_rx.recv() => {
                let Some(msg) = msg else {
                    debug!("sender dropped");
                    return DriverStopReason::UserAborted;
                };

                let text = match msg.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to serialize outgoing frame: {e}");
                        continue;
                    }
                };

                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                    debug!("failed to send frame: {e}");
                    continue;
                }
            },
            msg = ws_stream.next() => {
                let Some(msg) = msg else {
                    let _ = in_tx.send(DriverEvent::Closed(None)).await;
                    return DriverStopReason::ServerDisconnect;
                };

                match msg {
                    Ok(Message::Text(text)) => {
                        let msg = match to_client::decode(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                // Malformed frames are dropped; the session
                                // keeps running unless the server closes.
                                warn!("dropping undecodable frame: {e}");
                                continue;
                            }
                        };
                        if in_tx.send(DriverEvent::Message(msg)).await.is_err() {
                            // Receiver gone means the session was torn down.
                            return DriverStopReason::UserAborted;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let code = frame.and_then(|f| CloseCode::from_repr(u16::from(f.code)));
                        debug!("server closed the socket: {code:?}");
                        let _ = in_tx.send(DriverEvent::Closed(code)).await;
                        return DriverStopReason::ServerDisconnect;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Ok(other) => {
                        debug!("ignoring non-text frame: {other:?}");
                    }
                    Err(e) => {
                        debug!("websocket error: {e}");
                        let _ = in_tx.send(DriverEvent::Closed(None)).await;
                        return DriverStopReason::ServerError;
                    }
                }
            }
        }
    }
}
