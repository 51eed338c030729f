//! Backend connection settings
//!
//! Settings are plain read-only values handed to
//! [`ConnectionEstablisher`](super::ConnectionEstablisher) and
//! [`QueryExecutor`](crate::query::QueryExecutor) at construction. They can be
//! built in code with [`ConnectionSettings::builder`] or deserialized from the
//! owning application's configuration (durations are integer seconds).

use crate::host::Host;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default statement run on every new session
pub const DEFAULT_INIT_STATEMENT: &str = "SET SQL_MODE=''";

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// TLS material. All paths empty or absent means TLS is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SslSettings {
    /// Client private key (PEM)
    pub key: Option<PathBuf>,
    /// Client certificate (PEM)
    pub cert: Option<PathBuf>,
    /// CA bundle used to verify the server (PEM); absent disables verification
    pub ca: Option<PathBuf>,
}

impl SslSettings {
    /// Whether any TLS material is configured
    pub fn is_enabled(&self) -> bool {
        self.key().is_some() || self.cert().is_some() || self.ca().is_some()
    }

    /// Client key path, if set and non-empty
    pub fn key(&self) -> Option<&Path> {
        non_empty(&self.key)
    }

    /// Client certificate path, if set and non-empty
    pub fn cert(&self) -> Option<&Path> {
        non_empty(&self.cert)
    }

    /// CA path, if set and non-empty
    pub fn ca(&self) -> Option<&Path> {
        non_empty(&self.ca)
    }
}

/// Bounded retry for transient query failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Upper bound on the total time spent, retries included
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Settings shared by every backend connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    ssl: SslSettings,
    local_address: Option<String>,
    retry: RetryPolicy,
    #[serde(with = "duration_secs")]
    connect_timeout: Duration,
    init_statement: String,
    auto_reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ssl: SslSettings::default(),
            local_address: None,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(3),
            init_statement: DEFAULT_INIT_STATEMENT.to_string(),
            auto_reconnect: true,
        }
    }
}

impl ConnectionSettings {
    /// Create a builder starting from the defaults
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let settings = ConnectionSettings::builder()
    ///     .ssl(SslSettings { ca: Some("/etc/ssl/ca.pem".into()), ..Default::default() })
    ///     .local_address("10.0.0.5")
    ///     .max_retries(3)
    ///     .retry_timeout(Duration::from_secs(10))
    ///     .build();
    /// ```
    pub fn builder() -> ConnectionSettingsBuilder {
        ConnectionSettingsBuilder {
            settings: ConnectionSettings::default(),
        }
    }

    /// TLS material
    pub fn ssl(&self) -> &SslSettings {
        &self.ssl
    }

    /// Source address for outgoing connections
    pub fn local_address(&self) -> Option<&str> {
        self.local_address.as_deref().filter(|a| !a.is_empty())
    }

    /// Query retry policy
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Timeout for the TCP connect and handshake
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Statement run after authentication; empty means none
    pub fn init_statement(&self) -> &str {
        &self.init_statement
    }

    /// Whether broken sessions are reopened before the next command
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }
}

/// Builder for [`ConnectionSettings`]
#[derive(Debug, Clone)]
pub struct ConnectionSettingsBuilder {
    settings: ConnectionSettings,
}

impl ConnectionSettingsBuilder {
    /// TLS material
    pub fn ssl(mut self, ssl: SslSettings) -> Self {
        self.settings.ssl = ssl;
        self
    }

    /// Source address for outgoing TCP connections
    pub fn local_address(mut self, address: impl Into<String>) -> Self {
        self.settings.local_address = Some(address.into());
        self
    }

    /// Query retries after the first attempt (default: 1)
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.retry.max_retries = retries;
        self
    }

    /// Total time budget for a query including retries (default: 5 seconds)
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.settings.retry.timeout = timeout;
        self
    }

    /// Connect and handshake timeout (default: 3 seconds)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Statement run on every new session (default: `SET SQL_MODE=''`)
    pub fn init_statement(mut self, statement: impl Into<String>) -> Self {
        self.settings.init_statement = statement.into();
        self
    }

    /// Reopen broken sessions before the next command (default: true)
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.settings.auto_reconnect = enabled;
        self
    }

    /// Build the settings
    pub fn build(self) -> ConnectionSettings {
        self.settings
    }
}

/// One configured backend server.
///
/// Clones share the "already warned about missing TLS" flag, so the error is
/// logged once per backend no matter how many connections are opened to it.
#[derive(Debug, Clone)]
pub struct Backend {
    name: String,
    host: Host,
    extra_port: u16,
    tls_warned: Arc<AtomicBool>,
}

impl Backend {
    /// Create a backend
    pub fn new(name: impl Into<String>, host: Host) -> Self {
        Self {
            name: name.into(),
            host,
            extra_port: 0,
            tls_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Alternate port tried when the primary port fails; 0 disables
    pub fn extra_port(mut self, port: u16) -> Self {
        self.extra_port = port;
        self
    }

    /// Server name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured address
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Alternate port, if configured
    pub fn alternate_port(&self) -> Option<u16> {
        (self.extra_port > 0).then_some(self.extra_port)
    }

    /// Set the TLS warning flag; true only for the first caller
    pub(crate) fn first_tls_warning(&self) -> bool {
        !self.tls_warned.swap(true, Ordering::Relaxed)
    }
}

/// Login credentials
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// User name
    pub user: String,
    /// Password; empty means none
    #[serde(default)]
    pub password: String,
    /// Default database
    #[serde(default)]
    pub database: Option<String>,
}

impl Credentials {
    /// Credentials for `user` without a password
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    /// Set password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set default database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ConnectionSettings::builder().build();
        assert!(!settings.ssl().is_enabled());
        assert_eq!(settings.retry().max_retries, 1);
        assert_eq!(settings.retry().timeout, Duration::from_secs(5));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(3));
        assert_eq!(settings.init_statement(), "SET SQL_MODE=''");
        assert!(settings.auto_reconnect());
        assert_eq!(settings.local_address(), None);
    }

    #[test]
    fn test_builder_fluent() {
        let settings = ConnectionSettings::builder()
            .local_address("10.0.0.5")
            .max_retries(3)
            .retry_timeout(Duration::from_secs(10))
            .auto_reconnect(false)
            .build();

        assert_eq!(settings.local_address(), Some("10.0.0.5"));
        assert_eq!(settings.retry().max_retries, 3);
        assert_eq!(settings.retry().timeout, Duration::from_secs(10));
        assert!(!settings.auto_reconnect());
    }

    #[test]
    fn test_empty_ssl_paths_are_disabled() {
        let ssl = SslSettings {
            key: Some(PathBuf::new()),
            cert: None,
            ca: Some(PathBuf::from("")),
        };
        assert!(!ssl.is_enabled());

        let ssl = SslSettings {
            ca: Some("/etc/ssl/ca.pem".into()),
            ..Default::default()
        };
        assert!(ssl.is_enabled());
    }

    #[test]
    fn test_deserialize_settings() {
        let settings: ConnectionSettings = serde_json::from_str(
            r#"{
                "ssl": { "ca": "/etc/ssl/ca.pem" },
                "retry": { "max_retries": 4, "timeout": 20 },
                "connect_timeout": 7
            }"#,
        )
        .unwrap();

        assert!(settings.ssl().is_enabled());
        assert_eq!(settings.retry().max_retries, 4);
        assert_eq!(settings.retry().timeout, Duration::from_secs(20));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(7));
        assert_eq!(settings.init_statement(), DEFAULT_INIT_STATEMENT);
    }

    #[test]
    fn test_tls_warning_is_sticky_across_clones() {
        let backend = Backend::new("server1", Host::parse("127.0.0.1:3306"));
        let clone = backend.clone();
        assert!(backend.first_tls_warning());
        assert!(!clone.first_tls_warning());
        assert!(!backend.first_tls_warning());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("maxuser").password("hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("maxuser"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_alternate_port() {
        let backend = Backend::new("s", Host::parse("127.0.0.1:3306"));
        assert_eq!(backend.alternate_port(), None);
        assert_eq!(backend.extra_port(3307).alternate_port(), Some(3307));
    }
}
