//! Backend connection establishment
//!
//! [`ConnectionEstablisher::connect`] turns a configured [`Backend`] into a
//! live [`BackendConnection`]:
//!
//! 1. unix socket paths are connected directly, anything else via host and
//!    primary port
//! 2. if the primary port fails and the backend has an extra port, that port
//!    is tried once
//! 3. with TLS configured, a session that negotiated no cipher is closed and
//!    reported as [`Error::TlsPolicyViolation`]; the error is logged once per
//!    backend
//!
//! Failures are returned, never logged and swallowed, so the caller decides
//! whether to mark the backend down or retry.

use super::config::{Backend, ConnectionSettings, Credentials};
use super::conn::WireConnector;
use super::session::{Connector, Endpoint, Session};
use super::version::ServerVersion;
use crate::metrics::{counters, histograms, labels};
use crate::query::ResultSet;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Opens backend connections under a fixed set of settings
pub struct ConnectionEstablisher<C: Connector = WireConnector> {
    settings: Arc<ConnectionSettings>,
    connector: Arc<C>,
    tls_required: bool,
}

impl<C: Connector> Clone for ConnectionEstablisher<C> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            connector: Arc::clone(&self.connector),
            tls_required: self.tls_required,
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionEstablisher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEstablisher")
            .field("settings", &self.settings)
            .field("tls_required", &self.tls_required)
            .finish()
    }
}

impl ConnectionEstablisher<WireConnector> {
    /// Establisher speaking the wire protocol.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured TLS material cannot be loaded.
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        let connector = WireConnector::from_settings(&settings)?;
        Ok(Self::with_connector(settings, connector))
    }
}

impl<C: Connector> ConnectionEstablisher<C> {
    /// Establisher using a custom connector
    pub fn with_connector(settings: ConnectionSettings, connector: C) -> Self {
        let tls_required = settings.ssl().is_enabled();
        Self {
            settings: Arc::new(settings),
            connector: Arc::new(connector),
            tls_required,
        }
    }

    /// Settings in effect
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Whether sessions without a negotiated cipher are rejected
    pub fn requires_tls(&self) -> bool {
        self.tls_required
    }

    /// Open a connection to `backend`.
    ///
    /// # Errors
    ///
    /// * `Error::Config` - the backend address is invalid or has no usable port
    /// * `Error::ConnectFailed` - no endpoint could be reached
    /// * `Error::TlsPolicyViolation` - reachable, but the session is not encrypted
    /// * `Error::AuthRejected` - the server refused the handshake
    pub async fn connect(
        &self,
        backend: &Backend,
        credentials: &Credentials,
    ) -> Result<BackendConnection<C>> {
        let session = self.open(backend, credentials).await?;
        let mut conn = BackendConnection {
            session: None,
            backend: backend.clone(),
            credentials: credentials.clone(),
            establisher: self.clone(),
            charset: 0,
            version: ServerVersion::default(),
            tls_cipher: None,
        };
        conn.adopt(session);
        Ok(conn)
    }

    pub(crate) async fn open(
        &self,
        backend: &Backend,
        credentials: &Credentials,
    ) -> Result<C::Session> {
        async {
            let start = Instant::now();
            let result = self.open_session(backend, credentials).await;

            let label = match &result {
                Ok(_) => labels::RESULT_OK,
                Err(Error::ConnectFailed { .. }) => labels::RESULT_UNREACHABLE,
                Err(Error::TlsPolicyViolation { .. }) => labels::RESULT_TLS_VIOLATION,
                Err(_) => labels::RESULT_REJECTED,
            };
            counters::connect_completed(label);
            histograms::connect_duration(start.elapsed().as_millis() as u64);

            result
        }
        .instrument(tracing::info_span!(
            "connect",
            server = %backend.name(),
            address = %backend.host().address()
        ))
        .await
    }

    async fn open_session(
        &self,
        backend: &Backend,
        credentials: &Credentials,
    ) -> Result<C::Session> {
        let host = backend.host();
        if !host.is_valid() {
            return Err(Error::Config(format!(
                "server '{}' has an invalid address: {}",
                backend.name(),
                host
            )));
        }

        let session = if host.is_socket() {
            let endpoint = Endpoint::Unix(PathBuf::from(host.address()));
            self.attempt(backend, &endpoint, credentials).await?
        } else {
            let port = host
                .port()
                .and_then(|p| u16::try_from(p).ok())
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    Error::Config(format!("server '{}' has no usable port", backend.name()))
                })?;
            let primary = Endpoint::Tcp {
                host: host.address().to_string(),
                port,
            };

            match (self.attempt(backend, &primary, credentials).await, backend.alternate_port()) {
                (Ok(session), _) => session,
                (Err(e), Some(extra_port)) => {
                    tracing::warn!(
                        error = %e,
                        "Could not connect with normal port to server '{}', using extra_port",
                        backend.name()
                    );
                    counters::extra_port_fallback();
                    let extra = Endpoint::Tcp {
                        host: host.address().to_string(),
                        port: extra_port,
                    };
                    self.attempt(backend, &extra, credentials).await?
                }
                (Err(e), None) => return Err(e),
            }
        };

        if self.tls_required && session.tls_cipher().is_none() {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "error closing unencrypted session");
            }
            return Err(self.tls_violation(backend));
        }

        tracing::info!(
            server_version = %session.server_version(),
            charset = session.charset(),
            cipher = ?session.tls_cipher(),
            "connected to backend"
        );
        Ok(session)
    }

    async fn attempt(
        &self,
        backend: &Backend,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<C::Session> {
        tracing::debug!(%endpoint, "connecting");
        match self.connector.connect(endpoint, credentials).await {
            Ok(session) => Ok(session),
            Err(Error::TlsPolicyViolation { .. }) => Err(self.tls_violation(backend)),
            Err(e @ (Error::Io(_) | Error::Timeout(_) | Error::ConnectionClosed)) => {
                Err(Error::ConnectFailed {
                    target: format!("{} ({})", backend.name(), endpoint),
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn tls_violation(&self, backend: &Backend) -> Error {
        counters::tls_policy_violation();
        let err = Error::TlsPolicyViolation {
            target: backend.name().to_string(),
        };
        if backend.first_tls_warning() {
            tracing::error!("{}", err);
        }
        err
    }
}

/// Live connection to one backend.
///
/// Confined to one task at a time; every operation takes `&mut self`. When
/// the session breaks and auto-reconnect is enabled, the next command opens a
/// new session through the same establisher (same TLS enforcement).
pub struct BackendConnection<C: Connector = WireConnector> {
    session: Option<C::Session>,
    backend: Backend,
    credentials: Credentials,
    establisher: ConnectionEstablisher<C>,
    charset: u8,
    version: ServerVersion,
    tls_cipher: Option<String>,
}

impl<C: Connector> std::fmt::Debug for BackendConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("backend", &self.backend.name())
            .field("connected", &self.session.is_some())
            .field("charset", &self.charset)
            .field("version", &self.version.string)
            .field("tls_cipher", &self.tls_cipher)
            .finish()
    }
}

impl<C: Connector> BackendConnection<C> {
    fn adopt(&mut self, session: C::Session) {
        self.charset = session.charset();
        self.version = ServerVersion::parse(session.server_version());
        self.tls_cipher = session.tls_cipher();
        self.session = Some(session);
    }

    /// Backend this connection belongs to
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Character set negotiated by the most recent session
    pub fn charset(&self) -> u8 {
        self.charset
    }

    /// Server version reported by the most recent session
    pub fn server_version(&self) -> &ServerVersion {
        &self.version
    }

    /// Cipher suite of the most recent session
    pub fn tls_cipher(&self) -> Option<&str> {
        self.tls_cipher.as_deref()
    }

    /// Whether a session is currently open
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Run a query, reopening the session first if it broke earlier and
    /// auto-reconnect is enabled.
    ///
    /// A transient failure, or one that left the session out of step with the
    /// server, drops the session so the next call reconnects.
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        if self.session.is_none() {
            if !self.establisher.settings().auto_reconnect() {
                return Err(Error::ConnectionClosed);
            }
            tracing::debug!(server = %self.backend.name(), "reconnecting");
            self.reconnect().await?;
        }

        let session = self.session.as_mut().ok_or(Error::ConnectionClosed)?;
        let result = session.query(sql).await;
        let open = session.is_open();

        if let Err(e) = &result {
            if e.is_transient() || !open {
                tracing::debug!(server = %self.backend.name(), error = %e, "session lost");
                self.session = None;
            }
        }
        result
    }

    /// Replace the current session with a fresh one
    pub async fn reconnect(&mut self) -> Result<()> {
        self.discard();
        let session = self
            .establisher
            .open(&self.backend, &self.credentials)
            .await?;
        self.adopt(session);
        Ok(())
    }

    /// Drop the current session without a goodbye, e.g. after a command was
    /// abandoned mid-exchange
    pub fn discard(&mut self) {
        self.session = None;
    }

    /// Close the session
    pub async fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}
