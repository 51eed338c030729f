//! Protocol message encoding

use super::constants::{capabilities, commands, MAX_PAYLOAD_LEN};
use super::message::{FrontendMessage, HandshakeResponse};
use super::packet::PacketHeader;
use bytes::{BufMut, BytesMut};
use std::io;

/// Max packet size announced in the handshake response
pub const CLIENT_MAX_PACKET: u32 = 16 * 1024 * 1024;

/// Encode a frontend message as one or more packets, the first carrying `sequence`.
///
/// Payloads of `MAX_PAYLOAD_LEN` bytes or more are split; a payload whose
/// length is an exact multiple of `MAX_PAYLOAD_LEN` is followed by an empty packet.
pub fn encode_message(msg: &FrontendMessage, sequence: u8) -> io::Result<BytesMut> {
    let mut payload = BytesMut::new();

    match msg {
        FrontendMessage::SslRequest {
            capabilities,
            charset,
        } => {
            encode_ssl_request(&mut payload, *capabilities, *charset);
        }
        FrontendMessage::HandshakeResponse(response) => {
            encode_handshake_response(&mut payload, response)?;
        }
        FrontendMessage::AuthData(data) => payload.put_slice(data),
        FrontendMessage::Query(query) => {
            payload.put_u8(commands::COM_QUERY);
            payload.put_slice(query.as_bytes());
        }
        FrontendMessage::Ping => payload.put_u8(commands::COM_PING),
        FrontendMessage::Quit => payload.put_u8(commands::COM_QUIT),
        FrontendMessage::Empty => {}
    }

    Ok(frame(&payload, sequence))
}

/// Split `payload` into packets starting at `sequence`
pub fn frame(payload: &[u8], sequence: u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    let mut seq = sequence;
    let mut chunks = payload.chunks(MAX_PAYLOAD_LEN).peekable();

    if chunks.peek().is_none() {
        buf.put_slice(&PacketHeader { payload_len: 0, sequence: seq }.to_bytes());
        return buf;
    }

    let mut last_len = 0;
    for chunk in chunks {
        buf.put_slice(
            &PacketHeader {
                payload_len: chunk.len(),
                sequence: seq,
            }
            .to_bytes(),
        );
        buf.put_slice(chunk);
        seq = seq.wrapping_add(1);
        last_len = chunk.len();
    }

    if last_len == MAX_PAYLOAD_LEN {
        buf.put_slice(&PacketHeader { payload_len: 0, sequence: seq }.to_bytes());
    }

    buf
}

fn encode_ssl_request(buf: &mut BytesMut, caps: u32, charset: u8) {
    buf.put_u32_le(caps | capabilities::CLIENT_SSL);
    buf.put_u32_le(CLIENT_MAX_PACKET);
    buf.put_u8(charset);
    buf.put_bytes(0, 23);
}

fn encode_handshake_response(buf: &mut BytesMut, response: &HandshakeResponse) -> io::Result<()> {
    let caps = response.capabilities;

    buf.put_u32_le(caps);
    buf.put_u32_le(response.max_packet_size);
    buf.put_u8(response.charset);
    buf.put_bytes(0, 23);

    buf.put_slice(response.user.as_bytes());
    buf.put_u8(0);

    let auth = &response.auth_response;
    if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        put_lenenc_int(buf, auth.len() as u64);
        buf.put_slice(auth);
    } else if caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
        let len = u8::try_from(auth.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "auth response too long")
        })?;
        buf.put_u8(len);
        buf.put_slice(auth);
    } else {
        buf.put_slice(auth);
        buf.put_u8(0);
    }

    if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
        buf.put_slice(response.database.as_deref().unwrap_or("").as_bytes());
        buf.put_u8(0);
    }

    if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        buf.put_slice(response.auth_plugin.as_bytes());
        buf.put_u8(0);
    }

    Ok(())
}

/// Append a length-encoded integer
pub fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    match value {
        0..=0xfa => buf.put_u8(value as u8),
        0xfb..=0xffff => {
            buf.put_u8(0xfc);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xff_ffff => {
            buf.put_u8(0xfd);
            buf.put_uint_le(value, 3);
        }
        _ => {
            buf.put_u8(0xfe);
            buf.put_u64_le(value);
        }
    }
}

/// Append a length-encoded string
pub fn put_lenenc_str(buf: &mut BytesMut, value: &[u8]) {
    put_lenenc_int(buf, value.len() as u64);
    buf.put_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::charset;
    use crate::protocol::reader::PayloadReader;

    #[test]
    fn test_encode_query() {
        let msg = FrontendMessage::Query("SELECT 1".to_string());
        let buf = encode_message(&msg, 0).unwrap();

        assert_eq!(&buf[..4], &[9, 0, 0, 0]);
        assert_eq!(buf[4], commands::COM_QUERY);
        assert_eq!(&buf[5..], b"SELECT 1");
    }

    #[test]
    fn test_encode_quit() {
        let buf = encode_message(&FrontendMessage::Quit, 0).unwrap();
        assert_eq!(&buf[..], &[1, 0, 0, 0, commands::COM_QUIT]);
    }

    #[test]
    fn test_encode_ssl_request() {
        let msg = FrontendMessage::SslRequest {
            capabilities: capabilities::CLIENT_FLAGS,
            charset: charset::UTF8MB4,
        };
        let buf = encode_message(&msg, 1).unwrap();

        assert_eq!(buf.len(), 4 + 32);
        assert_eq!(buf[3], 1);
        let caps = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_ne!(caps & capabilities::CLIENT_SSL, 0);
        assert_eq!(buf[12], charset::UTF8MB4);
    }

    #[test]
    fn test_encode_handshake_response() {
        let response = HandshakeResponse {
            capabilities: capabilities::CLIENT_FLAGS | capabilities::CLIENT_CONNECT_WITH_DB,
            max_packet_size: CLIENT_MAX_PACKET,
            charset: charset::LATIN1,
            user: "maxuser".into(),
            auth_response: vec![7; 20],
            database: Some("test".into()),
            auth_plugin: "mysql_native_password".into(),
        };
        let buf = encode_message(&FrontendMessage::HandshakeResponse(response), 1).unwrap();

        let mut reader = PayloadReader::new(&buf[4..]);
        reader.skip(32);
        assert_eq!(reader.read_null_string(), "maxuser");
        assert_eq!(reader.read_lenenc_bytes(), Some(&[7u8; 20][..]));
        assert_eq!(reader.read_null_string(), "test");
        assert_eq!(reader.read_null_string(), "mysql_native_password");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_frame_splits_max_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN];
        let buf = frame(&payload, 0);

        assert_eq!(buf.len(), MAX_PAYLOAD_LEN + 8);
        assert_eq!(&buf[..4], &[0xff, 0xff, 0xff, 0]);
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_lenenc_int_boundaries() {
        let mut buf = BytesMut::new();
        put_lenenc_int(&mut buf, 250);
        put_lenenc_int(&mut buf, 251);
        put_lenenc_int(&mut buf, 70_000);

        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.read_lenenc_int(), Some(250));
        assert_eq!(reader.read_lenenc_int(), Some(251));
        assert_eq!(reader.read_lenenc_int(), Some(70_000));
    }
}
