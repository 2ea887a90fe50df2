//! Session lifecycle and dispatch.
//!
//! A session exclusively owns one identified connection. One task
//! drains decoded frames from the driver and routes them to the
//! pending-request table, the pending-batch table, or the event bus;
//! application code submits requests concurrently from any task.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, warn};

use crate::batch::{self, Batch, BatchResults};
use crate::config::ConnectConfig;
use crate::drivers::{ws, DriverEvent, DriverHandle};
use crate::error::Error;
use crate::events::{
    ClientEvent, CurrentPreviewSceneChanged, CurrentProgramSceneChanged, EventBus, EventStream,
    RawEventStream, StudioModeStateChanged,
};
use crate::handshake;
use crate::protocol::status::CloseCode;
use crate::protocol::subscription::EventSubscription;
use crate::protocol::to_client::{
    BatchResponseElement, EventMessage, RequestResponse, ServerMessage,
};
use crate::protocol::to_server::{ClientMessage, Reidentify, Request, RequestBatch};
use crate::requests::{
    ClientRequest, GetCurrentPreviewScene, GetCurrentProgramScene, GetStudioModeEnabled,
};

/// Completion side of one pending request: raw `responseData` on
/// success, typed failure otherwise.
type PendingTx = oneshot::Sender<Result<Option<JsonValue>, Error>>;
type PendingBatchTx = oneshot::Sender<Result<Vec<BatchResponseElement>, Error>>;

pub type Session = Arc<SessionInner>;

/// Connects, performs the identification handshake, and returns a live
/// session handle. Initial scene state is fetched in the background.
pub async fn connect(config: ConnectConfig) -> Result<Session, Error> {
    SessionInner::connect(config).await
}

/// Scene and studio-mode state mirrored from the server.
#[derive(Debug, Default)]
struct SceneState {
    studio_mode_enabled: bool,
    program_scene: Option<String>,
    preview_scene: Option<String>,
}

pub struct SessionInner {
    driver: DriverHandle,
    negotiated_rpc_version: u32,

    request_counter: AtomicU64,
    in_flight: Mutex<HashMap<String, PendingTx>>,
    in_flight_batches: Mutex<HashMap<String, PendingBatchTx>>,

    events: EventBus,
    scene_state: std::sync::Mutex<SceneState>,

    status: watch::Sender<bool>,
    close_code: std::sync::Mutex<Option<CloseCode>>,
}

impl SessionInner {
    pub async fn connect(config: ConnectConfig) -> Result<Session, Error> {
        let (driver, mut incoming, _task) = ws::connect(&config).await?;
        let identified = handshake::identify(&driver, &mut incoming, &config).await?;

        let (status, _) = watch::channel(true);
        let session = Arc::new(SessionInner {
            driver,
            negotiated_rpc_version: identified.negotiated_rpc_version,
            request_counter: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
            in_flight_batches: Mutex::new(HashMap::new()),
            events: EventBus::new(),
            scene_state: std::sync::Mutex::new(SceneState::default()),
            status,
            close_code: std::sync::Mutex::new(None),
        });

        let dispatcher = session.clone();
        tokio::spawn(async move { dispatcher.dispatch(incoming).await });

        let syncer = session.clone();
        tokio::spawn(async move {
            if let Err(e) = syncer.sync_scene_state().await {
                warn!("initial scene state sync failed: {e}");
            }
        });

        Ok(session)
    }

    async fn dispatch(self: &Arc<Self>, mut incoming: mpsc::Receiver<DriverEvent>) {
        let close_code = loop {
            match incoming.recv().await {
                Some(DriverEvent::Message(msg)) => self.on_message(msg).await,
                Some(DriverEvent::Closed(code)) => break code,
                None => break None,
            }
        };
        self.finish(close_code).await;
    }

    async fn on_message(self: &Arc<Self>, msg: ServerMessage) {
        match msg {
            ServerMessage::RequestResponse(response) => self.complete_request(response).await,
            ServerMessage::RequestBatchResponse(response) => {
                let mut batches = self.in_flight_batches.lock().await;
                let Some(tx) = batches.remove(&response.request_id) else {
                    warn!("batch response with unknown id {:?} dropped", response.request_id);
                    return;
                };
                if tx.send(Ok(response.results)).is_err() {
                    debug!("batch caller went away");
                }
            }
            ServerMessage::Event(event) => {
                self.observe_event(&event);
                self.events.publish(&event);
            }
            // The server must not re-enter the handshake on an
            // identified session.
            other => warn!("unexpected {:?} after identification", other.opcode()),
        }
    }

    async fn complete_request(self: &Arc<Self>, response: RequestResponse) {
        let mut in_flight = self.in_flight.lock().await;
        let Some(tx) = in_flight.remove(&response.request_id) else {
            warn!("response with unknown id {:?} dropped", response.request_id);
            return;
        };

        let outcome = if response.request_status.result {
            Ok(response.response_data)
        } else {
            Err(Error::RequestFailed {
                code: response.request_status.code,
                comment: response.request_status.comment,
            })
        };

        if tx.send(outcome).is_err() {
            // Caller dropped its future; the response is discarded.
            debug!("response {:?} had no waiting caller", response.request_id);
        }
    }

    /// Tracks the three scene-state events on the dispatch path, ahead
    /// of fan-out, so state never lags behind what subscribers see.
    fn observe_event(&self, event: &EventMessage) {
        let data = event.event_data.clone().unwrap_or(JsonValue::Null);
        match event.event_type.as_str() {
            StudioModeStateChanged::NAME => {
                if let Ok(change) = serde_json::from_value::<StudioModeStateChanged>(data) {
                    let mut state = self.scene_state();
                    state.studio_mode_enabled = change.studio_mode_enabled;
                    if !change.studio_mode_enabled {
                        state.preview_scene = None;
                    }
                }
            }
            CurrentProgramSceneChanged::NAME => {
                if let Ok(change) = serde_json::from_value::<CurrentProgramSceneChanged>(data) {
                    self.scene_state().program_scene = Some(change.scene_name);
                }
            }
            CurrentPreviewSceneChanged::NAME => {
                if let Ok(change) = serde_json::from_value::<CurrentPreviewSceneChanged>(data) {
                    self.scene_state().preview_scene = Some(change.scene_name);
                }
            }
            _ => {}
        }
    }

    /// Completes every pending future, ends event streams, and flips
    /// the status signal.
    async fn finish(self: &Arc<Self>, close_code: Option<CloseCode>) {
        debug!("session finished: {close_code:?}");
        *self.close_code.lock().unwrap_or_else(|e| e.into_inner()) = close_code;

        // Status flips first so submissions racing this teardown see a
        // dead session before the tables drain.
        self.status.send_replace(false);

        for (_, tx) in self.in_flight.lock().await.drain() {
            let _ = tx.send(Err(Error::Disconnected(close_code)));
        }
        for (_, tx) in self.in_flight_batches.lock().await.drain() {
            let _ = tx.send(Err(Error::Disconnected(close_code)));
        }
        self.events.shutdown();
    }

    fn next_request_id(&self) -> String {
        self.request_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Sends a typed request and waits for its correlated response.
    pub async fn send<R: ClientRequest>(self: &Arc<Self>, request: R) -> Result<R::Response, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.next_request_id();
        let data = serde_json::to_value(&request).map_err(Error::Encode)?;

        let (tx, rx) = oneshot::channel();
        self.in_flight.lock().await.insert(id.clone(), tx);

        let sent = self
            .driver
            .send(ClientMessage::Request(Request {
                request_type: R::NAME.to_string(),
                request_id: id.clone(),
                request_data: optional_data(data),
            }))
            .await;
        if let Err(e) = sent {
            self.in_flight.lock().await.remove(&id);
            return Err(e);
        }

        // Re-check after the send: a teardown racing this submission
        // may have drained the table before the entry landed in it.
        if !self.is_connected() && self.in_flight.lock().await.remove(&id).is_some() {
            return Err(Error::Disconnected(self.close_code()));
        }

        let outcome = match rx.await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(Error::Disconnected(self.close_code())),
        };

        serde_json::from_value(outcome.unwrap_or(JsonValue::Null)).map_err(Error::ResponseDecode)
    }

    /// Submits a batch and maps per-element results back to caller ids.
    pub async fn send_batch(self: &Arc<Self>, batch: Batch) -> Result<BatchResults, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let (execution_type, halt_on_failure, entries) = batch.into_parts();
        let batch_id = self.next_request_id();

        let (tx, rx) = oneshot::channel();
        self.in_flight_batches.lock().await.insert(batch_id.clone(), tx);

        let sent = self
            .driver
            .send(ClientMessage::RequestBatch(RequestBatch {
                request_id: batch_id.clone(),
                halt_on_failure: halt_on_failure.then_some(true),
                execution_type: Some(execution_type),
                requests: entries.iter().map(|entry| entry.wire()).collect(),
            }))
            .await;
        if let Err(e) = sent {
            self.in_flight_batches.lock().await.remove(&batch_id);
            return Err(e);
        }

        if !self.is_connected()
            && self.in_flight_batches.lock().await.remove(&batch_id).is_some()
        {
            return Err(Error::Disconnected(self.close_code()));
        }

        let results = match rx.await {
            Ok(results) => results?,
            Err(_) => return Err(Error::Disconnected(self.close_code())),
        };

        Ok(batch::map_results(&entries, results))
    }

    /// Homogeneous batch: one request type under caller-chosen ids.
    /// Entries the server never answered (halt-on-failure) are absent
    /// from the returned map.
    pub async fn send_batch_map<R: ClientRequest>(
        self: &Arc<Self>,
        requests: HashMap<String, R>,
    ) -> Result<HashMap<String, Result<R::Response, Error>>, Error> {
        let mut batch = Batch::new();
        let mut ids = Vec::with_capacity(requests.len());
        for (id, request) in requests {
            batch.push(Some(id.as_str()), request)?;
            ids.push(id);
        }

        let mut results = self.send_batch(batch).await?;

        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(result) = results.take::<R>(&id) {
                out.insert(id, result);
            }
        }
        Ok(out)
    }

    /// Replaces the event-subscription mask. Fire-and-forget; the
    /// server does not answer a reidentify.
    pub async fn reidentify(
        self: &Arc<Self>,
        subscriptions: Option<EventSubscription>,
    ) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.driver
            .send(ClientMessage::Reidentify(Reidentify {
                event_subscriptions: subscriptions,
            }))
            .await
    }

    /// Stream of every event of type `E`.
    pub fn subscribe<E: ClientEvent>(&self) -> EventStream<E> {
        self.events.typed_stream::<E>()
    }

    /// Merged raw stream over a set of discriminators.
    pub fn subscribe_many(&self, names: &[&str]) -> RawEventStream {
        self.events.raw_stream(names)
    }

    /// Resolves with the next event of type `E`.
    pub async fn next_event<E: ClientEvent>(self: &Arc<Self>) -> Result<E, Error> {
        let mut stream = self.subscribe::<E>();
        match stream.next().await {
            Some(Ok(event)) => Ok(event),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::Disconnected(self.close_code())),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow()
    }

    /// Connection-status signal; yields `false` once when the session
    /// ends.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    pub fn negotiated_rpc_version(&self) -> u32 {
        self.negotiated_rpc_version
    }

    /// Code the server closed with, when it closed with one.
    pub fn close_code(&self) -> Option<CloseCode> {
        *self.close_code.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_studio_mode_enabled(&self) -> bool {
        self.scene_state().studio_mode_enabled
    }

    pub fn current_program_scene_name(&self) -> Option<String> {
        self.scene_state().program_scene.clone()
    }

    pub fn current_preview_scene_name(&self) -> Option<String> {
        self.scene_state().preview_scene.clone()
    }

    /// Preview scene while studio mode is on, program scene otherwise.
    pub fn current_scene_name(&self) -> Option<String> {
        let state = self.scene_state();
        state.preview_scene.clone().or_else(|| state.program_scene.clone())
    }

    /// Tears the session down. Pending futures complete with a
    /// disconnect error. Safe to call more than once.
    pub async fn disconnect(self: &Arc<Self>) {
        if !self.is_connected() {
            return;
        }
        debug!("disconnecting");
        self.driver.disconnect();

        // Aborting the driver closes the incoming channel; dispatch
        // then flushes everything. Wait for the status flip so callers
        // observe a fully drained session.
        let mut status = self.status.subscribe();
        while *status.borrow() {
            if status.changed().await.is_err() {
                break;
            }
        }
    }

    async fn sync_scene_state(self: &Arc<Self>) -> Result<(), Error> {
        let studio = self.send(GetStudioModeEnabled).await?;
        self.scene_state().studio_mode_enabled = studio.studio_mode_enabled;

        if studio.studio_mode_enabled {
            let preview = self.send(GetCurrentPreviewScene).await?;
            self.scene_state().preview_scene = Some(preview.current_preview_scene_name);
        }

        let program = self.send(GetCurrentProgramScene).await?;
        self.scene_state().program_scene = Some(program.current_program_scene_name);
        Ok(())
    }

    fn scene_state(&self) -> std::sync::MutexGuard<'_, SceneState> {
        self.scene_state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn optional_data(data: JsonValue) -> Option<JsonValue> {
    match data {
        JsonValue::Null => None,
        other => Some(other),
    }
}

impl Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("rpc_version", &self.negotiated_rpc_version)
            .finish()
    }
}
