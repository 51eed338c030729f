//! Session seam between connection policy and the wire protocol
//!
//! [`ConnectionEstablisher`](super::ConnectionEstablisher) decides *where* to
//! connect and whether the result is acceptable; a [`Connector`] does the
//! connecting. The production connector is
//! [`WireConnector`](super::WireConnector).

use super::config::Credentials;
use crate::query::ResultSet;
use crate::Result;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

/// Where to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp {
        /// Host name or IP literal
        host: String,
        /// Port
        port: u16,
    },
    /// Unix domain socket path
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// An authenticated backend session
pub trait Session: Send {
    /// Run a text query and fetch the whole result
    fn query(&mut self, sql: &str) -> impl Future<Output = Result<ResultSet>> + Send;

    /// Whether the session can take another command. A session that lost
    /// track of the reply stream reports `false` and must be replaced.
    fn is_open(&self) -> bool;

    /// Character set id negotiated for the session
    fn charset(&self) -> u8;

    /// Version string announced by the server
    fn server_version(&self) -> &str;

    /// Negotiated TLS cipher suite; `None` for an unencrypted session
    fn tls_cipher(&self) -> Option<String>;

    /// Close the session
    fn close(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;
}

/// Opens sessions
pub trait Connector: Send + Sync {
    /// Session type produced
    type Session: Session;

    /// Open and authenticate a session on `endpoint`
    fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}
