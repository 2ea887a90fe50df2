//! Event fan-out.
//!
//! Subscribers get a bounded stream filtered by event discriminator. At
//! most one undelivered item is held per subscriber; a subscriber that
//! falls behind is dropped and sees a final [`EventStreamError::Lagged`]
//! before its stream ends. The receive loop is never blocked by a slow
//! subscriber.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::protocol::to_client::EventMessage;

/// A concrete event shape tied to its wire discriminator.
pub trait ClientEvent: DeserializeOwned + Send + 'static {
    const NAME: &'static str;
}

/// Error delivered through a single event stream; other subscribers are
/// unaffected.
#[derive(Debug, thiserror::Error)]
pub enum EventStreamError {
    #[error("could not decode event data")]
    Decode(#[source] serde_json::Error),
    #[error("subscriber lagged behind and was dropped")]
    Lagged,
}

/// One delivered event before typed decoding.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub event_type: String,
    pub data: JsonValue,
}

enum Filter {
    One(String),
    Many(HashSet<String>),
}

impl Filter {
    fn matches(&self, name: &str) -> bool {
        match self {
            Filter::One(subscribed) => subscribed == name,
            Filter::Many(subscribed) => subscribed.contains(name),
        }
    }
}

struct Subscriber {
    filter: Filter,
    tx: mpsc::Sender<RawEvent>,
    lagged: Arc<AtomicBool>,
}

#[derive(Default)]
struct Subscribers {
    list: Vec<Subscriber>,
    closed: bool,
}

pub(crate) struct EventBus {
    subscribers: Mutex<Subscribers>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    pub(crate) fn typed_stream<E: ClientEvent>(&self) -> EventStream<E> {
        let (rx, lagged) = self.attach(Filter::One(E::NAME.to_string()));
        EventStream {
            rx,
            lagged,
            done: false,
            _marker: PhantomData,
        }
    }

    pub(crate) fn raw_stream(&self, names: &[&str]) -> RawEventStream {
        let filter = Filter::Many(names.iter().map(|name| name.to_string()).collect());
        let (rx, lagged) = self.attach(filter);
        RawEventStream {
            rx,
            lagged,
            done: false,
        }
    }

    fn attach(&self, filter: Filter) -> (mpsc::Receiver<RawEvent>, Arc<AtomicBool>) {
        // One in-flight item per subscriber.
        let (tx, rx) = mpsc::channel(1);
        let lagged = Arc::new(AtomicBool::new(false));

        let mut subscribers = self.lock();
        if !subscribers.closed {
            subscribers.list.push(Subscriber {
                filter,
                tx,
                lagged: lagged.clone(),
            });
        }
        // On a closed bus the sender drops here and the stream ends
        // without ever yielding.

        (rx, lagged)
    }

    /// Fans an incoming event out to matching subscribers.
    pub(crate) fn publish(&self, event: &EventMessage) {
        let mut subscribers = self.lock();
        let mut matched = false;

        subscribers.list.retain(|sub| {
            if !sub.filter.matches(&event.event_type) {
                return true;
            }
            matched = true;

            let raw = RawEvent {
                event_type: event.event_type.clone(),
                data: event.event_data.clone().unwrap_or(JsonValue::Null),
            };
            match sub.tx.try_send(raw) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "dropping subscriber of {}: not keeping up",
                        event.event_type
                    );
                    sub.lagged.store(true, Ordering::Release);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });

        if !matched && !KNOWN_EVENTS.contains(&event.event_type.as_str()) {
            warn!("event with unknown type {:?} ignored", event.event_type);
        }
    }

    /// Ends every stream. Later subscriptions see an immediately
    /// finished stream.
    pub(crate) fn shutdown(&self) {
        let mut subscribers = self.lock();
        subscribers.closed = true;
        subscribers.list.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lazy sequence of decoded events of one type. Ends when the session
/// ends or the subscriber lagged out; a decode failure is yielded as an
/// error item and the stream continues.
pub struct EventStream<E> {
    rx: mpsc::Receiver<RawEvent>,
    lagged: Arc<AtomicBool>,
    done: bool,
    _marker: PhantomData<fn() -> E>,
}

impl<E: ClientEvent> Stream for EventStream<E> {
    type Item = Result<E, EventStreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(raw)) => Poll::Ready(Some(
                serde_json::from_value(raw.data).map_err(EventStreamError::Decode),
            )),
            Poll::Ready(None) => {
                this.done = true;
                if this.lagged.swap(false, Ordering::AcqRel) {
                    Poll::Ready(Some(Err(EventStreamError::Lagged)))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Merged stream over a set of discriminators; items stay raw.
pub struct RawEventStream {
    rx: mpsc::Receiver<RawEvent>,
    lagged: Arc<AtomicBool>,
    done: bool,
}

impl Stream for RawEventStream {
    type Item = Result<RawEvent, EventStreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(raw)) => Poll::Ready(Some(Ok(raw))),
            Poll::Ready(None) => {
                this.done = true;
                if this.lagged.swap(false, Ordering::AcqRel) {
                    Poll::Ready(Some(Err(EventStreamError::Lagged)))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// Typed event shapes. One struct per discriminator; the session's own
// state tracking uses the first three.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioModeStateChanged {
    pub studio_mode_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProgramSceneChanged {
    pub scene_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPreviewSceneChanged {
    pub scene_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCreated {
    pub scene_name: String,
    pub is_group: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRemoved {
    pub scene_name: String,
    pub is_group: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStateChanged {
    pub output_active: bool,
    pub output_state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStateChanged {
    pub output_active: bool,
    pub output_state: String,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMuteStateChanged {
    pub input_name: String,
    pub input_muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitStarted;

macro_rules! client_event {
    ($($shape:ident => $name:literal),* $(,)?) => {
        $(impl ClientEvent for $shape {
            const NAME: &'static str = $name;
        })*

        /// Discriminators the typed registry knows about; used to tell
        /// an unknown event type apart from a merely unsubscribed one.
        pub(crate) const KNOWN_EVENTS: &[&str] = &[$($name),*];
    };
}

client_event!(
    StudioModeStateChanged => "StudioModeStateChanged",
    CurrentProgramSceneChanged => "CurrentProgramSceneChanged",
    CurrentPreviewSceneChanged => "CurrentPreviewSceneChanged",
    SceneCreated => "SceneCreated",
    SceneRemoved => "SceneRemoved",
    StreamStateChanged => "StreamStateChanged",
    RecordStateChanged => "RecordStateChanged",
    InputMuteStateChanged => "InputMuteStateChanged",
    ExitStarted => "ExitStarted",
);
