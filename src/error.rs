//! Error types

use crate::protocol::constants::client_errors;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while connecting to or talking with a backend.
///
/// Address parsing, dequoting and reverse lookups never produce an `Error`;
/// their failures are reported as data (`HostType::Invalid`, `(text, false)`
/// and `None` respectively).
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration (unusable address, unreadable certificate, ...)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed or unexpected wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend could not be reached
    #[error("could not connect to '{target}': {reason}")]
    ConnectFailed {
        /// Backend name or address
        target: String,
        /// Transport-level reason
        reason: String,
    },

    /// The backend was reachable but the session is not encrypted although TLS is configured
    #[error(
        "an encrypted connection to '{target}' could not be created, \
         ensure that TLS is enabled on the target server"
    )]
    TlsPolicyViolation {
        /// Backend name or address
        target: String,
    },

    /// The backend rejected the handshake
    #[error("authentication to '{target}' rejected: {message} ({code})")]
    AuthRejected {
        /// Backend name or address
        target: String,
        /// Server error code
        code: u16,
        /// Server error message
        message: String,
    },

    /// ERR packet returned for a command
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        /// Server error code
        code: u16,
        /// Five character SQLSTATE, empty if the server sent none
        sql_state: String,
        /// Human readable message
        message: String,
    },

    /// Connection closed by the peer
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation attempted in the wrong connection state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Operation did not finish in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Whether the error is a connectivity fault that a retry on a fresh session may cure.
    ///
    /// Server-side rejections (syntax errors, access denied, ...) are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionClosed | Error::ConnectFailed { .. } => true,
            Error::Timeout(_) => true,
            Error::Server { code, .. } => client_errors::is_network_error(*code),
            _ => false,
        }
    }

    /// Numeric error code in the server/client error code space.
    pub fn code(&self) -> u16 {
        match self {
            Error::Server { code, .. } | Error::AuthRejected { code, .. } => *code,
            Error::ConnectFailed { .. } => client_errors::CR_CONN_HOST_ERROR,
            Error::TlsPolicyViolation { .. } => client_errors::CR_SSL_CONNECTION_ERROR,
            Error::Io(_) | Error::ConnectionClosed | Error::Timeout(_) => {
                client_errors::CR_SERVER_LOST
            }
            Error::Protocol(_) => client_errors::CR_MALFORMED_PACKET,
            Error::Config(_) | Error::InvalidState { .. } => client_errors::CR_UNKNOWN_ERROR,
        }
    }

    /// The message as the server would report it, without the variant prefix.
    pub fn server_message(&self) -> String {
        match self {
            Error::Server { message, .. } | Error::AuthRejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_errors_are_transient() {
        assert!(Error::ConnectionClosed.is_transient());
        assert!(Error::Timeout(Duration::from_secs(1)).is_transient());
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_transient());
        assert!(Error::Server {
            code: client_errors::CR_SERVER_GONE_ERROR,
            sql_state: "HY000".into(),
            message: "MySQL server has gone away".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_server_rejection_is_not_transient() {
        let err = Error::Server {
            code: 1064,
            sql_state: "42000".into(),
            message: "You have an error in your SQL syntax".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.code(), 1064);
        assert_eq!(err.server_message(), "You have an error in your SQL syntax");
    }

    #[test]
    fn test_tls_violation_is_distinct_from_connect_failure() {
        let tls = Error::TlsPolicyViolation {
            target: "server1".into(),
        };
        let net = Error::ConnectFailed {
            target: "server1".into(),
            reason: "connection refused".into(),
        };
        assert!(!tls.is_transient());
        assert!(net.is_transient());
        assert_ne!(tls.code(), net.code());
        assert!(tls.to_string().contains("ensure that TLS is enabled"));
    }
}
