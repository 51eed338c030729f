//! Transport abstraction (TCP with optional TLS vs Unix socket)

use super::tls::{server_name, TlsConfig};
use crate::{Error, Result};
use bytes::BytesMut;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream, UnixStream};

/// TCP stream variant: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum TcpVariant {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for TcpVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpVariant::Plain(_) => f.write_str("TcpVariant::Plain(TcpStream)"),
            TcpVariant::Tls(_) => f.write_str("TcpVariant::Tls(TlsStream)"),
        }
    }
}

impl TcpVariant {
    /// Write all bytes to the stream
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.write_all(buf).await?,
            TcpVariant::Tls(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the stream
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.flush().await?,
            TcpVariant::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            TcpVariant::Plain(stream) => stream.read_buf(buf).await?,
            TcpVariant::Tls(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shutdown the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.shutdown().await?,
            TcpVariant::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    /// Name of the negotiated cipher suite, `None` for plain TCP
    pub fn tls_cipher(&self) -> Option<String> {
        match self {
            TcpVariant::Plain(_) => None,
            TcpVariant::Tls(stream) => {
                let (_tcp, conn) = stream.get_ref();
                conn.negotiated_cipher_suite()
                    .map(|suite| format!("{:?}", suite.suite()))
            }
        }
    }
}

/// Transport layer abstraction
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// TCP socket (plain or TLS)
    Tcp(TcpVariant),
    /// Unix domain socket
    Unix(UnixStream),
}

impl Transport {
    /// Connect via plain TCP, optionally binding to a local source address.
    ///
    /// A local address that cannot be bound is logged and ignored.
    pub async fn connect_tcp(host: &str, port: u16, local: Option<IpAddr>) -> Result<Self> {
        let stream = match local {
            Some(local) => connect_from(host, port, local).await?,
            None => TcpStream::connect((host, port)).await?,
        };
        stream.set_nodelay(true)?;
        Ok(Transport::Tcp(TcpVariant::Plain(stream)))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Transport::Unix(stream))
    }

    /// Write bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.write_all(buf).await?,
            Transport::Unix(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.flush().await?,
            Transport::Unix(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read bytes into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Tcp(variant) => variant.read_buf(buf).await?,
            Transport::Unix(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Upgrade a plain TCP transport to TLS after the SSLRequest packet.
    ///
    /// Consumes `self` and returns a new `Transport` with a TLS-encrypted stream.
    /// Unix sockets cannot be upgraded.
    pub async fn upgrade_to_tls(self, tls_config: &TlsConfig, hostname: &str) -> Result<Self> {
        match self {
            Transport::Tcp(TcpVariant::Plain(tcp_stream)) => {
                let server_name = server_name(hostname)?;
                let tls_connector = tokio_rustls::TlsConnector::from(tls_config.client_config());
                let tls_stream = tls_connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|e| Error::Protocol(format!("TLS handshake failed: {}", e)))?;

                Ok(Transport::Tcp(TcpVariant::Tls(tls_stream)))
            }
            Transport::Tcp(TcpVariant::Tls(_)) => {
                Err(Error::Config("transport is already TLS-encrypted".into()))
            }
            Transport::Unix(_) => Err(Error::Config("cannot upgrade Unix socket to TLS".into())),
        }
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.shutdown().await?,
            Transport::Unix(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    /// Negotiated cipher suite (if TLS is active)
    pub fn tls_cipher(&self) -> Option<String> {
        match self {
            Transport::Tcp(variant) => variant.tls_cipher(),
            Transport::Unix(_) => None,
        }
    }

    /// Whether the transport is a Unix socket
    pub fn is_unix(&self) -> bool {
        matches!(self, Transport::Unix(_))
    }
}

async fn connect_from(host: &str, port: u16, local: IpAddr) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if addr.is_ipv4() != local.is_ipv4() {
            tracing::warn!(
                %local,
                peer = %addr,
                "local address family does not match target, using default source address"
            );
        } else if let Err(e) = socket.bind(SocketAddr::new(local, 0)) {
            tracing::warn!(
                %local,
                error = %e,
                "could not bind to local address, using default source address"
            );
        }

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for '{}'", host))
        })
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Transport::connect_tcp("127.0.0.1", port, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_connect_with_local_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let local: IpAddr = "127.0.0.1".parse().unwrap();
        let transport = Transport::connect_tcp("127.0.0.1", port, Some(local))
            .await
            .unwrap();
        assert!(!transport.is_unix());
        assert_eq!(transport.tls_cipher(), None);

        let (_accepted, peer) = listener.accept().await.unwrap();
        assert_eq!(peer.ip(), local);
    }

    #[tokio::test]
    async fn test_unbindable_local_address_is_not_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // TEST-NET-3, not assigned to any local interface
        let local: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(Transport::connect_tcp("127.0.0.1", port, Some(local))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unix_cannot_upgrade() {
        let (a, _b) = UnixStream::pair().unwrap();
        let tls = TlsConfig::from_settings(&crate::connection::SslSettings {
            key: Some("/nonexistent/key.pem".into()),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

        let err = Transport::Unix(a).upgrade_to_tls(&tls, "localhost").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
