//! End-to-end tests against a scripted in-process server.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use obs_ws_client::events::{CurrentProgramSceneChanged, StreamStateChanged, StudioModeStateChanged};
use obs_ws_client::requests::{
    GetInputMute, GetVersion, SetStudioModeEnabled, StartStream,
};
use obs_ws_client::{
    connect, Batch, BatchOutcome, ConnectConfig, Error, EventSubscription, HandshakeError,
    RequestStatus,
};

type ServerSocket = WebSocketStream<TcpStream>;

/// Canned answers for the session's initial state queries.
struct MockState {
    studio: bool,
    program: &'static str,
    preview: &'static str,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            studio: false,
            program: "Scene 1",
            preview: "Scene 1",
        }
    }
}

async fn spawn_server<F, Fut>(script: F) -> (ConnectConfig, JoinHandle<()>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await;
    });

    (ConnectConfig::new("127.0.0.1").port(addr.port()), task)
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut ServerSocket) -> Option<Value> {
    loop {
        match ws.next().await?.ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => {}
        }
    }
}

/// Hello → Identify → Identified without authentication; returns the
/// client's identify frame.
async fn serve_identify(ws: &mut ServerSocket) -> Value {
    send_json(
        ws,
        json!({ "op": 0, "d": { "obsWebSocketVersion": "5.3.0", "rpcVersion": 1 } }),
    )
    .await;
    let identify = recv_json(ws).await.expect("identify frame");
    assert_eq!(identify["op"], 1);
    send_json(ws, json!({ "op": 2, "d": { "negotiatedRpcVersion": 1 } })).await;
    identify
}

async fn respond_ok(ws: &mut ServerSocket, req: &Value, data: Option<Value>) {
    let mut d = json!({
        "requestType": req["d"]["requestType"].clone(),
        "requestId": req["d"]["requestId"].clone(),
        "requestStatus": { "result": true, "code": 100 },
    });
    if let Some(data) = data {
        d["responseData"] = data;
    }
    send_json(ws, json!({ "op": 7, "d": d })).await;
}

async fn respond_err(ws: &mut ServerSocket, req: &Value, code: u16, comment: &str) {
    send_json(
        ws,
        json!({ "op": 7, "d": {
            "requestType": req["d"]["requestType"].clone(),
            "requestId": req["d"]["requestId"].clone(),
            "requestStatus": { "result": false, "code": code, "comment": comment },
        }}),
    )
    .await;
}

fn state_answer(state: &MockState, request_type: &str) -> Option<Value> {
    match request_type {
        "GetStudioModeEnabled" => Some(json!({ "studioModeEnabled": state.studio })),
        "GetCurrentProgramScene" => Some(json!({ "currentProgramSceneName": state.program })),
        "GetCurrentPreviewScene" => Some(json!({ "currentPreviewSceneName": state.preview })),
        _ => None,
    }
}

/// Next frame that is not one of the session's own state queries;
/// those are answered from `state`. `None` once the socket closes.
async fn next_frame(ws: &mut ServerSocket, state: &MockState) -> Option<Value> {
    loop {
        let frame = recv_json(ws).await?;
        if frame["op"] == 6 {
            let request_type = frame["d"]["requestType"].as_str().unwrap_or_default();
            if let Some(data) = state_answer(state, request_type) {
                respond_ok(ws, &frame, Some(data)).await;
                continue;
            }
        }
        return Some(frame);
    }
}

async fn serve_until_close(mut ws: ServerSocket, state: MockState) {
    while next_frame(&mut ws, &state).await.is_some() {}
}

async fn with_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test timed out")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never reached");
}

#[tokio::test]
async fn handshake_without_auth() {
    let (identify_tx, identify_rx) = tokio::sync::oneshot::channel();
    let (config, server) = spawn_server(|mut ws| async move {
        let identify = serve_identify(&mut ws).await;
        identify_tx.send(identify).unwrap();
        serve_until_close(ws, MockState::default()).await;
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    assert!(session.is_connected());
    assert_eq!(session.negotiated_rpc_version(), 1);

    let identify = identify_rx.await.unwrap();
    assert_eq!(identify["d"]["rpcVersion"], 1);
    assert_eq!(identify["d"]["eventSubscriptions"], EventSubscription::ALL.bits());
    assert!(identify["d"].get("authentication").is_none());

    session.disconnect().await;
    assert!(!session.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn handshake_with_auth() {
    let (identify_tx, identify_rx) = tokio::sync::oneshot::channel();
    let (config, _server) = spawn_server(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "obsWebSocketVersion": "5.3.0",
                "rpcVersion": 1,
                "authentication": {
                    "challenge": "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
                    "salt": "lM1GncleixOOHFE3Lz3A4dmwR04Z3r3t",
                },
            }}),
        )
        .await;
        let identify = recv_json(&mut ws).await.expect("identify frame");
        identify_tx.send(identify).unwrap();
        send_json(&mut ws, json!({ "op": 2, "d": { "negotiatedRpcVersion": 1 } })).await;
        serve_until_close(ws, MockState::default()).await;
    })
    .await;

    let session = with_timeout(connect(config.password("supersecretpassword")))
        .await
        .unwrap();
    assert!(session.is_connected());

    let identify = identify_rx.await.unwrap();
    assert_eq!(
        identify["d"]["authentication"],
        "Dmb18GbBEPYqQb2EiLYsb8UMbiOSvT7jJp4NH7aOeqs="
    );

    session.disconnect().await;
}

#[tokio::test]
async fn handshake_requires_password() {
    let (config, _server) = spawn_server(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "obsWebSocketVersion": "5.3.0",
                "rpcVersion": 1,
                "authentication": { "challenge": "abc", "salt": "def" },
            }}),
        )
        .await;
        // The client bails before identifying.
        while recv_json(&mut ws).await.is_some() {}
    })
    .await;

    let err = with_timeout(connect(config)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::MissingPassword)
    ));
}

#[tokio::test]
async fn handshake_auth_rejection_close_code() {
    let (config, _server) = spawn_server(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "obsWebSocketVersion": "5.3.0",
                "rpcVersion": 1,
                "authentication": { "challenge": "abc", "salt": "def" },
            }}),
        )
        .await;
        let _identify = recv_json(&mut ws).await.expect("identify frame");
        ws.close(Some(CloseFrame {
            code: WsCloseCode::Library(4009),
            reason: "authentication failed".into(),
        }))
        .await
        .unwrap();
    })
    .await;

    let err = with_timeout(connect(config.password("wrong")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn request_resolves_with_typed_response() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();
        while let Some(frame) = next_frame(&mut ws, &state).await {
            if frame["d"]["requestType"] == "GetVersion" {
                respond_ok(&mut ws, &frame, Some(json!({ "obsVersion": "29.1.0" }))).await;
            }
        }
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    let version = with_timeout(session.send(GetVersion)).await.unwrap();
    assert_eq!(version.obs_version, "29.1.0");
    session.disconnect().await;
}

#[tokio::test]
async fn request_failure_surfaces_status() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();
        while let Some(frame) = next_frame(&mut ws, &state).await {
            if frame["op"] == 6 {
                respond_err(&mut ws, &frame, 604, "Scene not found").await;
            }
        }
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    let err = with_timeout(session.send(GetVersion)).await.unwrap_err();
    match err {
        Error::RequestFailed { code, comment } => {
            assert_eq!(code, RequestStatus::InvalidResourceState);
            assert_eq!(comment.as_deref(), Some("Scene not found"));
        }
        other => panic!("expected request failure, got {other:?}"),
    }
    session.disconnect().await;
}

#[tokio::test]
async fn responses_correlate_out_of_order() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();

        let first = next_frame(&mut ws, &state).await.expect("first request");
        let second = next_frame(&mut ws, &state).await.expect("second request");

        // Answer in reverse arrival order; correlation is by id.
        for frame in [second, first] {
            let muted = frame["d"]["requestData"]["inputName"] == "Mic A";
            respond_ok(&mut ws, &frame, Some(json!({ "inputMuted": muted }))).await;
        }

        serve_until_close(ws, state).await;
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    let (a, b) = with_timeout(async {
        tokio::join!(
            session.send(GetInputMute { input_name: "Mic A".into() }),
            session.send(GetInputMute { input_name: "Mic B".into() }),
        )
    })
    .await;

    assert!(a.unwrap().input_muted);
    assert!(!b.unwrap().input_muted);
    session.disconnect().await;
}

#[tokio::test]
async fn batch_with_halt_maps_prefix() {
    let (batch_tx, batch_rx) = tokio::sync::oneshot::channel();
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();

        let frame = loop {
            let frame = next_frame(&mut ws, &state).await.expect("batch frame");
            if frame["op"] == 8 {
                break frame;
            }
        };

        send_json(
            &mut ws,
            json!({ "op": 9, "d": {
                "requestId": frame["d"]["requestId"].clone(),
                "results": [
                    {
                        "requestType": "GetVersion",
                        "requestId": "a",
                        "requestStatus": { "result": true, "code": 100 },
                        "responseData": { "obsVersion": "29.1.0" },
                    },
                    {
                        "requestType": "GetInputMute",
                        "requestId": "b",
                        "requestStatus": { "result": false, "code": 600, "comment": "no such input" },
                    },
                ],
            }}),
        )
        .await;

        batch_tx.send(frame).unwrap();
        serve_until_close(ws, state).await;
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();

    let mut batch = Batch::new().halt_on_failure(true);
    batch.push(Some("a"), GetVersion).unwrap();
    batch
        .push(Some("b"), GetInputMute { input_name: "Missing".into() })
        .unwrap();
    batch.push(Some("c"), GetVersion).unwrap();

    let mut results = with_timeout(session.send_batch(batch)).await.unwrap();

    let frame = batch_rx.await.unwrap();
    assert_eq!(frame["d"]["haltOnFailure"], true);
    assert_eq!(frame["d"]["executionType"], 0);
    assert_eq!(frame["d"]["requests"].as_array().unwrap().len(), 3);
    assert_eq!(frame["d"]["requests"][1]["requestId"], "b");

    assert_eq!(results.len(), 2);
    let a = results.take::<GetVersion>("a").unwrap().unwrap();
    assert_eq!(a.obs_version, "29.1.0");
    assert!(matches!(
        results.outcome("b"),
        Some(BatchOutcome::Failed { code: RequestStatus::ResourceNotFound, .. })
    ));
    assert!(results.take::<GetVersion>("c").is_none());

    session.disconnect().await;
}

#[tokio::test]
async fn homogeneous_batch_keyed_by_caller_ids() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();

        let frame = loop {
            let frame = next_frame(&mut ws, &state).await.expect("batch frame");
            if frame["op"] == 8 {
                break frame;
            }
        };

        let results: Vec<Value> = frame["d"]["requests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|request| {
                json!({
                    "requestType": request["requestType"].clone(),
                    "requestId": request["requestId"].clone(),
                    "requestStatus": { "result": true, "code": 100 },
                    "responseData": {
                        "inputMuted": request["requestData"]["inputName"] == "Mic A",
                    },
                })
            })
            .collect();
        send_json(
            &mut ws,
            json!({ "op": 9, "d": {
                "requestId": frame["d"]["requestId"].clone(),
                "results": results,
            }}),
        )
        .await;

        serve_until_close(ws, state).await;
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();

    let requests = HashMap::from([
        ("x".to_string(), GetInputMute { input_name: "Mic A".into() }),
        ("y".to_string(), GetInputMute { input_name: "Mic B".into() }),
    ]);
    let mut out = with_timeout(session.send_batch_map(requests)).await.unwrap();

    assert!(out.remove("x").unwrap().unwrap().input_muted);
    assert!(!out.remove("y").unwrap().unwrap().input_muted);
    assert!(out.is_empty());

    session.disconnect().await;
}

#[tokio::test]
async fn events_filter_by_type() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();
        while let Some(frame) = next_frame(&mut ws, &state).await {
            if frame["d"]["requestType"] == "GetVersion" {
                // Event first, then the response: the response future
                // doubles as a delivery barrier for the event.
                send_json(
                    &mut ws,
                    json!({ "op": 5, "d": {
                        "eventType": "CurrentProgramSceneChanged",
                        "eventIntent": 4,
                        "eventData": { "sceneName": "Scene 2" },
                    }}),
                )
                .await;
                respond_ok(&mut ws, &frame, Some(json!({ "obsVersion": "29.1.0" }))).await;
            }
        }
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();

    // Let the initial state sync land before pushing events over it.
    wait_until(|| session.current_program_scene_name().is_some()).await;

    let mut scenes = session.subscribe::<CurrentProgramSceneChanged>();
    let mut studio = session.subscribe::<StudioModeStateChanged>();

    with_timeout(session.send(GetVersion)).await.unwrap();

    let event = with_timeout(scenes.next()).await.unwrap().unwrap();
    assert_eq!(event.scene_name, "Scene 2");
    assert_eq!(session.current_program_scene_name().as_deref(), Some("Scene 2"));

    session.disconnect().await;

    // The other subscriber saw nothing before the session ended.
    assert!(with_timeout(studio.next()).await.is_none());
    assert!(with_timeout(scenes.next()).await.is_none());
}

#[tokio::test]
async fn studio_mode_state_tracks_events() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState {
            studio: true,
            program: "Scene 1",
            preview: "Scene P",
        };
        while let Some(frame) = next_frame(&mut ws, &state).await {
            if frame["d"]["requestType"] == "SetStudioModeEnabled" {
                send_json(
                    &mut ws,
                    json!({ "op": 5, "d": {
                        "eventType": "StudioModeStateChanged",
                        "eventIntent": 1,
                        "eventData": { "studioModeEnabled": false },
                    }}),
                )
                .await;
                respond_ok(&mut ws, &frame, None).await;
            }
        }
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();

    // The program scene is synced last, so this covers the whole
    // initial fetch.
    wait_until(|| {
        session.is_studio_mode_enabled()
            && session.current_preview_scene_name().as_deref() == Some("Scene P")
            && session.current_program_scene_name().is_some()
    })
    .await;
    assert_eq!(session.current_scene_name().as_deref(), Some("Scene P"));

    with_timeout(session.send(SetStudioModeEnabled {
        studio_mode_enabled: false,
    }))
    .await
    .unwrap();

    // The event preceded the response, so the flag is already down and
    // the preview scene is cleared.
    assert!(!session.is_studio_mode_enabled());
    assert!(session.current_preview_scene_name().is_none());
    assert_eq!(session.current_scene_name().as_deref(), Some("Scene 1"));

    session.disconnect().await;
}

#[tokio::test]
async fn disconnect_flushes_pending_work() {
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();
        while let Some(frame) = next_frame(&mut ws, &state).await {
            if frame["d"]["requestType"] == "StartStream" {
                // Never answer; close instead.
                ws.close(None).await.unwrap();
                break;
            }
        }
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    let mut stream_events = session.subscribe::<StreamStateChanged>();
    let mut status = session.status();

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.send(StartStream).await }
    });

    let err = with_timeout(pending).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Disconnected(None)));

    with_timeout(status.wait_for(|connected| !connected))
        .await
        .unwrap();
    assert!(!session.is_connected());

    // Existing streams end; new subscriptions never yield.
    assert!(with_timeout(stream_events.next()).await.is_none());
    let mut late = session.subscribe::<StreamStateChanged>();
    assert!(with_timeout(late.next()).await.is_none());

    // New submissions are rejected synchronously.
    let err = session.send(GetVersion).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn reidentify_is_fire_and_forget() {
    let (frame_tx, frame_rx) = tokio::sync::oneshot::channel();
    let (config, _server) = spawn_server(|mut ws| async move {
        serve_identify(&mut ws).await;
        let state = MockState::default();
        loop {
            let frame = next_frame(&mut ws, &state).await.expect("reidentify frame");
            if frame["op"] == 3 {
                frame_tx.send(frame).unwrap();
                break;
            }
        }
        serve_until_close(ws, state).await;
    })
    .await;

    let session = with_timeout(connect(config)).await.unwrap();
    let mask = EventSubscription::GENERAL | EventSubscription::INPUT_VOLUME_METERS;
    session.reidentify(Some(mask)).await.unwrap();

    let frame = with_timeout(frame_rx).await.unwrap();
    assert_eq!(frame["d"]["eventSubscriptions"], mask.bits());

    session.disconnect().await;
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = with_timeout(connect(ConnectConfig::new("127.0.0.1").port(port)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
