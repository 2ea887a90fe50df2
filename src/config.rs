use std::str::FromStr;

use crate::protocol::subscription::EventSubscription;

pub const DEFAULT_PORT: u16 = 4455;

/// Wire encoding advertised during subprotocol negotiation.
///
/// Only JSON envelopes are implemented. [`Encoding::MsgPack`] selects
/// the `obswebsocket.msgpack` subprotocol string and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    MsgPack,
}

impl Encoding {
    pub fn subprotocol(self) -> &'static str {
        match self {
            Encoding::Json => "obswebsocket.json",
            Encoding::MsgPack => "obswebsocket.msgpack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// Parameters for [`crate::connect`].
///
/// Parseable from the URL form `scheme://host:port[/password]`, where
/// the path segment, when present, is the password.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub encoding: Encoding,
    /// Mask sent with `Identify`.
    pub subscriptions: EventSubscription,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Ws,
            host: host.into(),
            port: DEFAULT_PORT,
            password: None,
            encoding: Encoding::Json,
            subscriptions: EventSubscription::ALL,
        }
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn subscriptions(mut self, subscriptions: EventSubscription) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    pub(crate) fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseConfigError {
    #[error("missing `://` separator in `{0}`")]
    MissingScheme(String),
    #[error("unsupported scheme `{0}`, expected `ws` or `wss`")]
    UnsupportedScheme(String),
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port `{0}`")]
    InvalidPort(String),
}

impl FromStr for ConnectConfig {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| ParseConfigError::MissingScheme(s.to_string()))?;
        let scheme = match scheme {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => return Err(ParseConfigError::UnsupportedScheme(other.to_string())),
        };

        // The path segment is the password; there is no deeper path
        // structure in these URLs.
        let (authority, password) = match rest.split_once('/') {
            Some((authority, password)) if !password.is_empty() => {
                (authority, Some(password.to_string()))
            }
            Some((authority, _)) => (authority, None),
            None => (rest, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| ParseConfigError::InvalidPort(port.to_string()))?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ParseConfigError::EmptyHost);
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            password,
            encoding: Encoding::Json,
            subscriptions: EventSubscription::ALL,
        })
    }
}
