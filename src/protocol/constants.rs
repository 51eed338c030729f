//! MariaDB/MySQL protocol constants

/// Packet header length: 3-byte little-endian payload length + 1-byte sequence number
pub const HEADER_LEN: usize = 4;

/// Largest payload a single packet can carry; a payload of exactly this size
/// is continued in the next packet
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// Most columns a result set may declare; larger counts are treated as malformed
pub const MAX_COLUMNS: usize = 4096;

/// Handshake protocol version sent in the server greeting
pub const PROTOCOL_VERSION: u8 = 10;

/// Offset of the message text inside an ERR payload: marker, code, '#', SQLSTATE
pub const ERR_MESSAGE_OFFSET: usize = 1 + 2 + 1 + 5;

/// First payload byte of server responses
pub mod markers {
    /// OK packet
    pub const OK: u8 = 0x00;

    /// Request for the client to send a local file (`LOAD DATA LOCAL INFILE`)
    pub const LOCAL_INFILE: u8 = 0xfb;

    /// EOF packet (when the payload is shorter than 9 bytes) or auth switch request
    pub const EOF: u8 = 0xfe;

    /// ERR packet
    pub const ERR: u8 = 0xff;

    /// Additional authentication data during the handshake
    pub const AUTH_MORE_DATA: u8 = 0x01;

    /// SQLSTATE marker inside an ERR packet
    pub const SQL_STATE: u8 = b'#';
}

/// Command bytes (first payload byte of client commands)
pub mod commands {
    /// Close the session
    pub const COM_QUIT: u8 = 0x01;

    /// Text protocol query
    pub const COM_QUERY: u8 = 0x03;

    /// Liveness check
    pub const COM_PING: u8 = 0x0e;
}

/// Capability flags
pub mod capabilities {
    /// New, more secure passwords
    pub const CLIENT_LONG_PASSWORD: u32 = 1;

    /// Longer column flags
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;

    /// Database name in the handshake response
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;

    /// 4.1 protocol
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;

    /// Switch to TLS after the greeting
    pub const CLIENT_SSL: u32 = 1 << 11;

    /// Transaction status in OK packets
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;

    /// 4.1 authentication
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;

    /// Pluggable authentication
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;

    /// Length-encoded auth response
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;

    /// Capabilities this client asks for (intersected with the server's)
    pub const CLIENT_FLAGS: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;
}

/// Character set ids
pub mod charset {
    /// latin1_swedish_ci, the server default when nothing else is known
    pub const LATIN1: u8 = 0x08;

    /// utf8_general_ci
    pub const UTF8: u8 = 33;

    /// utf8mb4_general_ci
    pub const UTF8MB4: u8 = 45;
}

/// Client-side error codes (the `CR_*` range)
pub mod client_errors {
    /// Unknown error
    pub const CR_UNKNOWN_ERROR: u16 = 2000;

    /// Can't create a socket
    pub const CR_SOCKET_CREATE_ERROR: u16 = 2001;

    /// Can't connect through the local socket
    pub const CR_CONNECTION_ERROR: u16 = 2002;

    /// Can't connect to the server
    pub const CR_CONN_HOST_ERROR: u16 = 2003;

    /// Can't create a TCP/IP socket
    pub const CR_IPSOCK_ERROR: u16 = 2004;

    /// Server has gone away
    pub const CR_SERVER_GONE_ERROR: u16 = 2006;

    /// Error on the TCP connection
    pub const CR_TCP_CONNECTION: u16 = 2011;

    /// Lost connection during a query
    pub const CR_SERVER_LOST: u16 = 2013;

    /// Malformed packet
    pub const CR_MALFORMED_PACKET: u16 = 2027;

    /// TLS connection error
    pub const CR_SSL_CONNECTION_ERROR: u16 = 2026;

    /// Whether `code` is a network-level failure that a reconnect may cure
    pub fn is_network_error(code: u16) -> bool {
        matches!(
            code,
            CR_SOCKET_CREATE_ERROR
                | CR_CONNECTION_ERROR
                | CR_CONN_HOST_ERROR
                | CR_IPSOCK_ERROR
                | CR_SERVER_GONE_ERROR
                | CR_TCP_CONNECTION
                | CR_SERVER_LOST
        )
    }
}
