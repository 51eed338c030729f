//! Connection management
//!
//! This module handles:
//! * Settings, backends and credentials
//! * Transport abstraction (TCP with optional TLS vs Unix socket)
//! * The wire session (greeting, TLS upgrade, authentication, queries)
//! * Establishment policy (socket vs TCP, extra port fallback, TLS enforcement)
//! * State machine enforcement

mod config;
mod conn;
mod establish;
mod session;
mod state;
mod tls;
mod transport;
mod version;

pub use config::{
    Backend, ConnectionSettings, ConnectionSettingsBuilder, Credentials, RetryPolicy,
    SslSettings, DEFAULT_INIT_STATEMENT,
};
pub use conn::{Connection, WireConnector};
pub use establish::{BackendConnection, ConnectionEstablisher};
pub use session::{Connector, Endpoint, Session};
#[cfg(test)]
pub(crate) use session::mock;
pub use state::ConnectionState;
pub use tls::{server_name, TlsConfig};
pub use transport::{TcpVariant, Transport};
pub use version::{ServerType, ServerVersion};
