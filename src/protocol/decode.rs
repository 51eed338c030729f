//! Protocol message decoding

use super::constants::{
    capabilities, charset, markers, HEADER_LEN, MAX_COLUMNS, PROTOCOL_VERSION,
};
use super::message::{AuthResponse, ColumnDefinition, ErrPacket, Greeting, OkPacket};
use super::packet::{ErrorView, PacketHeader};
use super::reader::PayloadReader;
use bytes::{Bytes, BytesMut};
use std::io;

/// Default authentication plugin when the server does not announce one
pub const DEFAULT_AUTH_PLUGIN: &str = "mysql_native_password";

/// A framed packet taken off the read buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Sequence number
    pub sequence: u8,
    /// Payload
    pub payload: Bytes,
}

/// Decode one packet from the front of `data` without consuming it.
///
/// # Returns
/// `Ok((packet, consumed))` - Packet and number of bytes it occupies
/// `Err(e)` - `UnexpectedEof` if the header or payload is incomplete
pub fn decode_packet(data: &BytesMut) -> io::Result<(RawPacket, usize)> {
    let header = PacketHeader::parse(data).ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete packet header")
    })?;

    if data.len() < header.packet_len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete packet body",
        ));
    }

    let payload = Bytes::copy_from_slice(&data[HEADER_LEN..header.packet_len()]);
    Ok((
        RawPacket {
            sequence: header.sequence,
            payload,
        },
        header.packet_len(),
    ))
}

fn invalid(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed {}", what))
}

/// Decode the server greeting (initial handshake v10)
pub fn decode_greeting(payload: &[u8]) -> io::Result<Greeting> {
    let mut reader = PayloadReader::new(payload);

    let protocol_version = reader.read_u8().ok_or_else(|| invalid("greeting"))?;
    if protocol_version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported protocol version: {}", protocol_version),
        ));
    }

    let server_version = reader.read_null_string();
    let connection_id = reader
        .read_u32_le()
        .ok_or_else(|| invalid("greeting connection id"))?;
    let scramble_head = reader
        .read_bytes(8)
        .ok_or_else(|| invalid("greeting scramble"))?;
    reader.skip(1);

    let caps_lower = reader
        .read_u16_le()
        .ok_or_else(|| invalid("greeting capabilities"))?;
    let server_charset = reader.read_u8().unwrap_or(charset::LATIN1);
    let status_flags = reader.read_u16_le().unwrap_or(0);
    let caps_upper = reader.read_u16_le().unwrap_or(0);
    let server_caps = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

    let scramble_len = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        usize::from(reader.read_u8().unwrap_or(0))
    } else {
        0
    };
    reader.skip(10);

    let mut scramble = scramble_head.to_vec();
    if server_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
        let tail_len = scramble_len.saturating_sub(8).max(13);
        let tail = reader
            .read_bytes(tail_len.min(reader.remaining()))
            .unwrap_or(&[]);
        let tail = tail.strip_suffix(&[0]).unwrap_or(tail);
        scramble.extend_from_slice(tail);
    }

    let auth_plugin = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        reader.read_null_string()
    } else {
        String::new()
    };

    Ok(Greeting {
        protocol_version,
        server_version,
        connection_id,
        scramble,
        capabilities: server_caps,
        charset: server_charset,
        status_flags,
        auth_plugin: if auth_plugin.is_empty() {
            DEFAULT_AUTH_PLUGIN.to_string()
        } else {
            auth_plugin
        },
    })
}

/// Decode an OK payload (marker included)
pub fn decode_ok(payload: &[u8]) -> io::Result<OkPacket> {
    let mut reader = PayloadReader::new(payload);
    if reader.peek() == Some(markers::OK) || reader.peek() == Some(markers::EOF) {
        reader.skip(1);
    }

    let affected_rows = reader.read_lenenc_int().ok_or_else(|| invalid("OK packet"))?;
    let last_insert_id = reader.read_lenenc_int().ok_or_else(|| invalid("OK packet"))?;
    let status_flags = reader.read_u16_le().unwrap_or(0);
    let warnings = reader.read_u16_le().unwrap_or(0);
    let info = String::from_utf8_lossy(reader.read_rest()).into_owned();

    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Decode an ERR payload (marker included). Never fails; truncation yields empty fields.
pub fn decode_err(payload: &[u8]) -> ErrPacket {
    let view = ErrorView::parse(payload);
    ErrPacket {
        code: view.code,
        sql_state: view.sql_state_lossy(),
        message: view.message_lossy(),
    }
}

/// Whether `payload` is an EOF packet (`0xfe` marker and shorter than 9 bytes)
pub fn is_eof(payload: &[u8]) -> bool {
    payload.first() == Some(&markers::EOF) && payload.len() < 9
}

/// Decode a packet received while authenticating
pub fn decode_auth_response(payload: &[u8]) -> io::Result<AuthResponse> {
    match payload.first() {
        Some(&markers::OK) => Ok(AuthResponse::Ok(decode_ok(payload)?)),
        Some(&markers::ERR) => Ok(AuthResponse::Err(decode_err(payload))),
        Some(&markers::EOF) => {
            let mut reader = PayloadReader::new(&payload[1..]);
            let plugin = reader.read_null_string();
            let scramble = reader.read_rest();
            let scramble = scramble.strip_suffix(&[0]).unwrap_or(scramble);
            Ok(AuthResponse::Switch {
                plugin: if plugin.is_empty() {
                    DEFAULT_AUTH_PLUGIN.to_string()
                } else {
                    plugin
                },
                scramble: scramble.to_vec(),
            })
        }
        Some(&markers::AUTH_MORE_DATA) => Ok(AuthResponse::MoreData(payload[1..].to_vec())),
        Some(other) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected authentication packet: 0x{:02x}", other),
        )),
        None => Err(invalid("authentication packet")),
    }
}

/// Decode the column count that opens a result set
pub fn decode_column_count(payload: &[u8]) -> io::Result<usize> {
    PayloadReader::new(payload)
        .read_lenenc_int()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n <= MAX_COLUMNS)
        .ok_or_else(|| invalid("column count"))
}

/// Decode a column definition (protocol 4.1)
pub fn decode_column_definition(payload: &[u8]) -> io::Result<ColumnDefinition> {
    let mut reader = PayloadReader::new(payload);

    let _catalog = reader.read_lenenc_bytes().ok_or_else(|| invalid("column catalog"))?;
    let schema = reader.read_lenenc_string().ok_or_else(|| invalid("column schema"))?;
    let table = reader.read_lenenc_string().ok_or_else(|| invalid("column table"))?;
    let _org_table = reader.read_lenenc_bytes().ok_or_else(|| invalid("column org_table"))?;
    let name = reader.read_lenenc_string().ok_or_else(|| invalid("column name"))?;
    let _org_name = reader.read_lenenc_bytes().ok_or_else(|| invalid("column org_name"))?;

    // Fixed-length fields are optional for what we use them for
    let _fixed_len = reader.read_lenenc_int();
    let column_charset = reader.read_u16_le().unwrap_or(0);
    let _length = reader.read_u32_le();
    let column_type = reader.read_u8().unwrap_or(0);

    Ok(ColumnDefinition {
        schema,
        table,
        name,
        charset: column_charset,
        column_type,
    })
}

/// Decode a text protocol row with `columns` values; `0xfb` is NULL
pub fn decode_text_row(payload: &[u8], columns: usize) -> io::Result<Vec<Option<String>>> {
    let mut reader = PayloadReader::new(payload);
    // Each value takes at least one byte
    let mut values = Vec::with_capacity(columns.min(payload.len()));

    for _ in 0..columns {
        if reader.peek() == Some(markers::LOCAL_INFILE) {
            reader.skip(1);
            values.push(None);
        } else {
            let value = reader.read_lenenc_string().ok_or_else(|| invalid("row"))?;
            values.push(Some(value));
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn greeting_payload(caps: u32, plugin: &str) -> Vec<u8> {
        let mut p = vec![PROTOCOL_VERSION];
        p.extend_from_slice(b"10.5.8-MariaDB\0");
        p.extend_from_slice(&7u32.to_le_bytes());
        p.extend_from_slice(b"abcdefgh");
        p.push(0);
        p.extend_from_slice(&(caps as u16).to_le_bytes());
        p.push(charset::UTF8);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
        p.push(21);
        p.extend_from_slice(&[0; 10]);
        p.extend_from_slice(b"ijklmnopqrst\0");
        p.extend_from_slice(plugin.as_bytes());
        p.push(0);
        p
    }

    #[test]
    fn test_decode_packet_incomplete() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[5, 0, 0, 0, 1, 2]);
        let err = decode_packet(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_decode_packet_complete() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 0, 0, 3, 0x0e, 9, 9]);
        let (packet, consumed) = decode_packet(&buf).unwrap();
        assert_eq!(packet.sequence, 3);
        assert_eq!(&packet.payload[..], &[0x0e]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_decode_greeting() {
        let caps = capabilities::CLIENT_FLAGS | capabilities::CLIENT_SSL;
        let greeting = decode_greeting(&greeting_payload(caps, "caching_sha2_password")).unwrap();

        assert_eq!(greeting.server_version, "10.5.8-MariaDB");
        assert_eq!(greeting.connection_id, 7);
        assert_eq!(greeting.scramble, b"abcdefghijklmnopqrst");
        assert_eq!(greeting.capabilities, caps);
        assert_eq!(greeting.charset, charset::UTF8);
        assert_eq!(greeting.auth_plugin, "caching_sha2_password");
    }

    #[test]
    fn test_decode_greeting_rejects_old_protocol() {
        let mut payload = greeting_payload(capabilities::CLIENT_FLAGS, "");
        payload[0] = 9;
        assert!(decode_greeting(&payload).is_err());
    }

    #[test]
    fn test_decode_ok() {
        let ok = decode_ok(&[0x00, 0x02, 0x05, 0x02, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(ok.affected_rows, 2);
        assert_eq!(ok.last_insert_id, 5);
        assert_eq!(ok.status_flags, 2);
        assert_eq!(ok.warnings, 1);
    }

    #[test]
    fn test_decode_auth_switch() {
        let mut payload = vec![markers::EOF];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(b"01234567890123456789\0");

        match decode_auth_response(&payload).unwrap() {
            AuthResponse::Switch { plugin, scramble } => {
                assert_eq!(plugin, "mysql_native_password");
                assert_eq!(scramble, b"01234567890123456789");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_text_row_with_null() {
        let payload = [1, b'1', 0xfb, 3, b'a', b'b', b'c'];
        let row = decode_text_row(&payload, 3).unwrap();
        assert_eq!(
            row,
            vec![Some("1".to_string()), None, Some("abc".to_string())]
        );
    }

    #[test]
    fn test_decode_column_count_bounds() {
        assert_eq!(decode_column_count(&[0x03]).unwrap(), 3);
        assert_eq!(decode_column_count(&[0xfc, 0x00, 0x10]).unwrap(), MAX_COLUMNS);
        assert!(decode_column_count(&[0xfc, 0x01, 0x10]).is_err());

        let huge = [0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(decode_column_count(&huge).is_err());
        assert!(decode_column_count(&[]).is_err());
    }

    #[test]
    fn test_decode_text_row_huge_column_count() {
        assert!(decode_text_row(&[1, b'x'], usize::MAX).is_err());
    }

    #[test]
    fn test_eof_detection() {
        assert!(is_eof(&[0xfe, 0, 0, 2, 0]));
        assert!(!is_eof(&[0xfe, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        assert!(!is_eof(&[]));
    }
}
