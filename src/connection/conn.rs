//! Wire protocol session

use super::config::{ConnectionSettings, Credentials};
use super::session::{Connector, Endpoint, Session};
use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::{caching_sha2, scramble, AuthPlugin};
use crate::protocol::constants::{capabilities, markers, MAX_PAYLOAD_LEN};
use crate::protocol::decode::{
    decode_auth_response, decode_column_count, decode_column_definition, decode_err,
    decode_greeting, decode_ok, decode_text_row, is_eof,
};
use crate::protocol::encode::CLIENT_MAX_PACKET;
use crate::protocol::message::{AuthResponse, ErrPacket, HandshakeResponse};
use crate::protocol::packet::PacketHeader;
use crate::protocol::{decode_packet, encode_message, FrontendMessage, RawPacket};
use crate::query::ResultSet;
use crate::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tracing::Instrument;

fn protocol_error(e: io::Error) -> Error {
    Error::Protocol(e.to_string())
}

fn server_error(err: ErrPacket) -> Error {
    Error::Server {
        code: err.code,
        sql_state: err.sql_state,
        message: err.message,
    }
}

fn packet_count(buf: &[u8]) -> u8 {
    let mut offset = 0;
    let mut count = 0u8;
    while let Some(header) = buf.get(offset..).and_then(PacketHeader::parse) {
        offset += header.packet_len();
        count = count.wrapping_add(1);
    }
    count
}

/// Opens [`Connection`]s using the settings' TLS material, source address,
/// connect timeout and init statement
#[derive(Debug, Clone)]
pub struct WireConnector {
    tls: Option<TlsConfig>,
    local_address: Option<IpAddr>,
    connect_timeout: Duration,
    init_statement: String,
}

impl WireConnector {
    /// Build from settings.
    ///
    /// A local address that is not an IP literal is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the TLS material cannot be loaded.
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self> {
        let tls = TlsConfig::from_settings(settings.ssl())?;

        let local_address = settings.local_address().and_then(|addr| match addr.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(
                    local_address = %addr,
                    "local address is not an IP address, using default source address"
                );
                None
            }
        });

        Ok(Self {
            tls,
            local_address,
            connect_timeout: settings.connect_timeout(),
            init_statement: settings.init_statement().to_string(),
        })
    }

    /// Whether sessions are encrypted
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    async fn open(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<Connection> {
        let transport = match endpoint {
            Endpoint::Tcp { host, port } => {
                Transport::connect_tcp(host, *port, self.local_address).await?
            }
            Endpoint::Unix(path) => Transport::connect_unix(path).await?,
        };

        let mut conn = Connection::new(transport);
        conn.handshake(endpoint, credentials, self.tls.as_ref()).await?;

        if !self.init_statement.is_empty() {
            conn.query(&self.init_statement).await?;
        }

        Ok(conn)
    }
}

impl Connector for WireConnector {
    type Session = Connection;

    async fn connect(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<Connection> {
        let timeout = self.connect_timeout;
        tokio::time::timeout(timeout, self.open(endpoint, credentials))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }
}

/// One authenticated MariaDB/MySQL client session
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    sequence: u8,
    connection_id: u32,
    server_version: String,
    charset: u8,
    capabilities: u32,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .field("server_version", &self.server_version)
            .field("charset", &self.charset)
            .finish()
    }
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            sequence: 0,
            connection_id: 0,
            server_version: String::new(),
            charset: 0,
            capabilities: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server thread id of the session
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Capabilities negotiated with the server
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Read the greeting, negotiate TLS and authenticate
    pub async fn handshake(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        tls: Option<&TlsConfig>,
    ) -> Result<()> {
        async {
            let target = endpoint.to_string();

            let packet = self.read_packet().await?;
            if packet.first() == Some(&markers::ERR) {
                let err = decode_err(&packet);
                return Err(Error::AuthRejected {
                    target,
                    code: err.code,
                    message: err.message,
                });
            }

            let greeting = decode_greeting(&packet).map_err(protocol_error)?;
            if greeting.capabilities & capabilities::CLIENT_PROTOCOL_41 == 0 {
                return Err(Error::Protocol(
                    "server does not support protocol 4.1".into(),
                ));
            }
            tracing::debug!(
                server_version = %greeting.server_version,
                connection_id = greeting.connection_id,
                auth_plugin = %greeting.auth_plugin,
                "received greeting"
            );

            self.connection_id = greeting.connection_id;
            self.server_version = greeting.server_version.clone();
            self.charset = greeting.charset;

            let mut caps = capabilities::CLIENT_FLAGS & greeting.capabilities;
            if credentials.database.is_some() {
                caps |= capabilities::CLIENT_CONNECT_WITH_DB & greeting.capabilities;
            }

            let encrypted = match tls {
                Some(tls) => {
                    // Fail before any credentials are sent
                    let hostname = match endpoint {
                        Endpoint::Tcp { host, .. } => host.as_str(),
                        Endpoint::Unix(_) => return Err(Error::TlsPolicyViolation { target }),
                    };
                    if greeting.capabilities & capabilities::CLIENT_SSL == 0 {
                        return Err(Error::TlsPolicyViolation { target });
                    }
                    caps |= capabilities::CLIENT_SSL;
                    self.negotiate_tls(tls, hostname, caps).await?;
                    true
                }
                None => false,
            };
            self.capabilities = caps;

            let mut plugin =
                AuthPlugin::from_name(&greeting.auth_plugin).unwrap_or(AuthPlugin::NativePassword);
            if plugin.sends_cleartext() && !encrypted {
                plugin = AuthPlugin::NativePassword;
            }

            self.state.transition(ConnectionState::Authenticating)?;
            let response = HandshakeResponse {
                capabilities: caps,
                max_packet_size: CLIENT_MAX_PACKET,
                charset: self.charset,
                user: credentials.user.clone(),
                auth_response: plugin.respond(&credentials.password, &greeting.scramble),
                database: credentials.database.clone(),
                auth_plugin: plugin.name().to_string(),
            };
            self.send(&FrontendMessage::HandshakeResponse(response)).await?;

            self.authenticate(&target, credentials, plugin, encrypted).await?;

            self.state.transition(ConnectionState::Idle)?;
            tracing::debug!("handshake complete");
            Ok(())
        }
        .instrument(tracing::info_span!(
            "handshake",
            endpoint = %endpoint,
            user = %credentials.user
        ))
        .await
    }

    async fn negotiate_tls(&mut self, tls: &TlsConfig, hostname: &str, caps: u32) -> Result<()> {
        self.state.transition(ConnectionState::NegotiatingTls)?;

        self.send(&FrontendMessage::SslRequest {
            capabilities: caps,
            charset: self.charset,
        })
        .await?;

        let transport = self.transport.take().ok_or(Error::ConnectionClosed)?;
        self.transport = Some(transport.upgrade_to_tls(tls, hostname).await?);

        tracing::debug!(cipher = ?self.cipher(), "TLS connection established");
        Ok(())
    }

    async fn authenticate(
        &mut self,
        target: &str,
        credentials: &Credentials,
        mut plugin: AuthPlugin,
        encrypted: bool,
    ) -> Result<()> {
        loop {
            let packet = self.read_packet().await?;

            match decode_auth_response(&packet).map_err(protocol_error)? {
                AuthResponse::Ok(_) => {
                    tracing::debug!(plugin = plugin.name(), "authentication successful");
                    return Ok(());
                }
                AuthResponse::Err(err) => {
                    return Err(Error::AuthRejected {
                        target: target.to_string(),
                        code: err.code,
                        message: err.message,
                    });
                }
                AuthResponse::Switch {
                    plugin: name,
                    scramble,
                } => {
                    let next = AuthPlugin::from_name(&name).ok_or_else(|| {
                        Error::Protocol(format!("unsupported authentication plugin '{}'", name))
                    })?;
                    if next.sends_cleartext() && !encrypted {
                        return Err(Error::Protocol(format!(
                            "server requested '{}' over an unencrypted connection",
                            name
                        )));
                    }

                    tracing::debug!(from = plugin.name(), to = next.name(), "auth switch");
                    plugin = next;
                    let data = plugin.respond(&credentials.password, &scramble);
                    self.send(&FrontendMessage::AuthData(data)).await?;
                }
                AuthResponse::MoreData(data) => match (plugin, data.first()) {
                    (AuthPlugin::CachingSha2Password, Some(&caching_sha2::FAST_AUTH_SUCCESS)) => {
                        tracing::debug!("caching_sha2_password fast auth");
                    }
                    (AuthPlugin::CachingSha2Password, Some(&caching_sha2::PERFORM_FULL_AUTH)) => {
                        if !encrypted {
                            return Err(Error::Protocol(
                                "caching_sha2_password full authentication requires TLS".into(),
                            ));
                        }
                        let data = scramble::clear_password(&credentials.password);
                        self.send(&FrontendMessage::AuthData(data)).await?;
                    }
                    _ => {
                        return Err(Error::Protocol(format!(
                            "unexpected authentication data for '{}'",
                            plugin.name()
                        )));
                    }
                },
            }
        }
    }

    async fn run_query(&mut self, sql: &str) -> Result<ResultSet> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            other => {
                return Err(Error::InvalidState {
                    expected: ConnectionState::Idle.to_string(),
                    actual: other.to_string(),
                })
            }
        }

        self.state.transition(ConnectionState::QueryInProgress)?;
        self.sequence = 0;
        self.send(&FrontendMessage::Query(sql.to_string())).await?;

        let packet = self.read_packet().await?;
        match packet.first() {
            Some(&markers::OK) => {
                let ok = decode_ok(&packet).map_err(protocol_error)?;
                self.state.transition(ConnectionState::Idle)?;
                Ok(ResultSet::affected(ok.affected_rows))
            }
            Some(&markers::ERR) => {
                self.state.transition(ConnectionState::Idle)?;
                Err(server_error(decode_err(&packet)))
            }
            Some(&markers::LOCAL_INFILE) => {
                self.send(&FrontendMessage::Empty).await?;
                let reply = self.read_packet().await?;
                self.state.transition(ConnectionState::Idle)?;
                if reply.first() == Some(&markers::ERR) {
                    return Err(server_error(decode_err(&reply)));
                }
                Err(Error::Protocol("LOCAL INFILE requests are not supported".into()))
            }
            _ => {
                self.state.transition(ConnectionState::ReadingResults)?;
                let result = self.read_result_set(&packet).await;
                match &result {
                    // An ERR packet ends the result set cleanly
                    Ok(_) | Err(Error::Server { .. }) => {
                        self.state.transition(ConnectionState::Idle)?
                    }
                    // Unread packets of this result may still be in flight
                    Err(_) => self.state.transition(ConnectionState::Closed)?,
                }
                result
            }
        }
    }

    async fn read_result_set(&mut self, first: &[u8]) -> Result<ResultSet> {
        let count = decode_column_count(first).map_err(protocol_error)?;

        let mut columns = Vec::new();
        for _ in 0..count {
            let packet = self.read_packet().await?;
            let column = decode_column_definition(&packet).map_err(protocol_error)?;
            columns.push(column.name);
        }

        let packet = self.read_packet().await?;
        if !is_eof(&packet) {
            return Err(Error::Protocol(
                "expected EOF after column definitions".into(),
            ));
        }

        let mut rows = Vec::new();
        loop {
            let packet = self.read_packet().await?;
            if is_eof(&packet) {
                break;
            }
            if packet.first() == Some(&markers::ERR) {
                return Err(server_error(decode_err(&packet)));
            }
            rows.push(decode_text_row(&packet, count).map_err(protocol_error)?);
        }

        tracing::debug!(columns = count, rows = rows.len(), "result set received");
        Ok(ResultSet::new(columns, rows))
    }

    fn cipher(&self) -> Option<String> {
        self.transport.as_ref().and_then(Transport::tls_cipher)
    }

    /// Send a frontend message, advancing the sequence by the packets written
    async fn send(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg, self.sequence)?;
        self.sequence = self.sequence.wrapping_add(packet_count(&buf));

        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Receive one logical payload, joining continuation packets
    async fn read_packet(&mut self) -> Result<Bytes> {
        let mut joined = BytesMut::new();

        loop {
            let packet = self.receive_packet().await?;
            self.sequence = packet.sequence.wrapping_add(1);
            let continued = packet.payload.len() == MAX_PAYLOAD_LEN;

            if joined.is_empty() && !continued {
                return Ok(packet.payload);
            }
            joined.extend_from_slice(&packet.payload);
            if !continued {
                return Ok(joined.freeze());
            }
        }
    }

    async fn receive_packet(&mut self) -> Result<RawPacket> {
        loop {
            match decode_packet(&self.read_buf) {
                Ok((packet, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(packet);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(protocol_error(e)),
            }

            let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

impl Session for Connection {
    async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let span = tracing::debug_span!("query", connection_id = self.connection_id);
        let result = self.run_query(sql).instrument(span).await;

        // A failure mid-exchange leaves the stream position unknown
        if result.is_err() && self.state != ConnectionState::Idle {
            self.state = ConnectionState::Closed;
        }
        result
    }

    fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed && self.transport.is_some()
    }

    fn charset(&self) -> u8 {
        self.charset
    }

    fn server_version(&self) -> &str {
        &self.server_version
    }

    fn tls_cipher(&self) -> Option<String> {
        self.cipher()
    }

    async fn close(mut self) -> Result<()> {
        if self.state != ConnectionState::Closed {
            self.state.transition(ConnectionState::Closed)?;
            self.sequence = 0;
            let _ = self.send(&FrontendMessage::Quit).await;
        }
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.shutdown().await?;
        Ok(())
    }
}
