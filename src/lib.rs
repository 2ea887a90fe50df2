//! Client for the OBS Studio WebSocket control protocol
//! (obs-websocket 5.x).
//!
//! A [`Session`] owns one identified connection: typed requests are
//! correlated by id, events fan out to subscriber streams, and the
//! connection status is observable through a watch signal.
//!
//! ```no_run
//! use obs_ws_client::requests::GetVersion;
//! use obs_ws_client::{connect, ConnectConfig};
//!
//! # async fn run() -> Result<(), obs_ws_client::Error> {
//! let config: ConnectConfig = "ws://localhost:4455/supersecretpassword".parse()?;
//! let session = connect(config).await?;
//!
//! let version = session.send(GetVersion).await?;
//! println!("obs {}", version.obs_version);
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod auth;
mod drivers;
mod handshake;

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod requests;
pub mod session;

pub use batch::{Batch, BatchOutcome, BatchResults};
pub use config::{ConnectConfig, Encoding, Scheme};
pub use error::{Error, HandshakeError};
pub use events::{ClientEvent, EventStream, EventStreamError, RawEvent, RawEventStream};
pub use protocol::status::{CloseCode, RequestBatchExecutionType, RequestStatus};
pub use protocol::subscription::EventSubscription;
pub use protocol::RPC_VERSION;
pub use requests::ClientRequest;
pub use session::{connect, Session, SessionInner};
