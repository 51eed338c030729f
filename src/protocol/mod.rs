//! MariaDB/MySQL client/server protocol
//!
//! [`packet`] is the read-only framing and classification layer used to
//! inspect raw buffers; [`decode`] and [`encode`] turn payloads into typed
//! messages for the live session.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;
pub mod packet;
pub mod reader;

pub use decode::{decode_packet, RawPacket};
pub use encode::encode_message;
pub use message::{
    AuthResponse, ColumnDefinition, ErrPacket, FrontendMessage, Greeting, HandshakeResponse,
    OkPacket,
};
pub use packet::{decode_packets, describe_packets, DecodedPacket, ErrorView, PacketKind, Packets};
