//! Protocol message types

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Truncated handshake response asking the server to switch to TLS
    SslRequest {
        /// Negotiated capability flags (including `CLIENT_SSL`)
        capabilities: u32,
        /// Requested character set
        charset: u8,
    },

    /// Handshake response (protocol 4.1)
    HandshakeResponse(HandshakeResponse),

    /// Raw authentication data (auth switch reply, cleartext password, ...)
    AuthData(Vec<u8>),

    /// Text protocol query
    Query(String),

    /// Liveness check
    Ping,

    /// Session close
    Quit,

    /// Empty packet, used to decline a `LOCAL INFILE` request
    Empty,
}

/// Handshake response fields
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// Negotiated capability flags
    pub capabilities: u32,
    /// Max packet size the client accepts
    pub max_packet_size: u32,
    /// Requested character set
    pub charset: u8,
    /// User name
    pub user: String,
    /// Scrambled password
    pub auth_response: Vec<u8>,
    /// Default database, sent when `CLIENT_CONNECT_WITH_DB` is negotiated
    pub database: Option<String>,
    /// Authentication plugin the response was computed with
    pub auth_plugin: String,
}

/// Initial handshake packet (protocol version 10) sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Protocol version, always 10
    pub protocol_version: u8,
    /// Server version string, e.g. `10.5.8-MariaDB`
    pub server_version: String,
    /// Connection (thread) id
    pub connection_id: u32,
    /// Authentication scramble (20 bytes for the built-in plugins)
    pub scramble: Vec<u8>,
    /// Server capability flags
    pub capabilities: u32,
    /// Server default character set
    pub charset: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Default authentication plugin
    pub auth_plugin: String,
}

/// OK packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Affected rows
    pub affected_rows: u64,
    /// Last insert id
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Warning count
    pub warnings: u16,
    /// Human readable info
    pub info: String,
}

/// ERR packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Error code
    pub code: u16,
    /// SQLSTATE, empty if the server sent none
    pub sql_state: String,
    /// Error message
    pub message: String,
}

/// Column definition (protocol 4.1), reduced to what result handling needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Schema
    pub schema: String,
    /// Table alias
    pub table: String,
    /// Column alias
    pub name: String,
    /// Column character set
    pub charset: u16,
    /// Column type
    pub column_type: u8,
}

/// Authentication exchange packet received after the handshake response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    /// Authenticated
    Ok(OkPacket),
    /// Rejected
    Err(ErrPacket),
    /// Server asks to restart authentication with another plugin
    Switch {
        /// Plugin name
        plugin: String,
        /// New scramble
        scramble: Vec<u8>,
    },
    /// Plugin specific data (`0x01` prefix stripped)
    MoreData(Vec<u8>),
}
