//! Read-only packet framing over a byte buffer
//!
//! [`decode_packets`] walks a buffer holding one or more concatenated packets
//! and yields a [`DecodedPacket`] view for each complete one. The buffer is
//! only borrowed; a trailing partial packet (or partial header) ends the walk
//! without an error, so the decoder can be pointed at any prefix of a stream.

use super::constants::{markers, ERR_MESSAGE_OFFSET, HEADER_LEN};

/// Packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (24 bits)
    pub payload_len: usize,
    /// Sequence number
    pub sequence: u8,
}

impl PacketHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `data`.
    ///
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are available.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let header = data.get(..HEADER_LEN)?;
        let payload_len =
            usize::from(header[0]) | (usize::from(header[1]) << 8) | (usize::from(header[2]) << 16);
        Some(Self {
            payload_len,
            sequence: header[3],
        })
    }

    /// Encode the header
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let len = self.payload_len as u32;
        [
            (len & 0xff) as u8,
            ((len >> 8) & 0xff) as u8,
            ((len >> 16) & 0xff) as u8,
            self.sequence,
        ]
    }

    /// Header length plus payload length
    pub fn packet_len(self) -> usize {
        HEADER_LEN + self.payload_len
    }
}

/// Classification of a response packet by its first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 0x00
    Ok,
    /// 0xff
    Err,
    /// 0xfb
    LocalInfileRequest,
    /// Anything else: result set metadata, rows, EOF, ...
    ResultSetOrOther,
}

impl PacketKind {
    /// Classify a payload. An empty payload is `ResultSetOrOther`.
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(&markers::OK) => Self::Ok,
            Some(&markers::ERR) => Self::Err,
            Some(&markers::LOCAL_INFILE) => Self::LocalInfileRequest,
            _ => Self::ResultSetOrOther,
        }
    }
}

/// One complete packet inside a borrowed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPacket<'a> {
    /// Sequence number
    pub sequence: u8,
    /// Payload length from the header
    pub payload_len: usize,
    /// Classification
    pub kind: PacketKind,
    /// The payload bytes
    pub payload: &'a [u8],
}

impl<'a> DecodedPacket<'a> {
    /// Error code and message if this is an ERR packet
    pub fn error(&self) -> Option<ErrorView<'a>> {
        match self.kind {
            PacketKind::Err => Some(ErrorView::parse(self.payload)),
            _ => None,
        }
    }
}

/// Borrowed view of an ERR payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorView<'a> {
    /// Error code, 0 if the payload is too short to hold one
    pub code: u16,
    /// SQLSTATE bytes; empty when the packet carries no `#` marker
    pub sql_state: &'a [u8],
    /// Message bytes, running to the end of the payload
    pub message: &'a [u8],
}

impl<'a> ErrorView<'a> {
    /// Parse an ERR payload (including the 0xff marker byte).
    ///
    /// Every offset is bounds-checked; a truncated payload yields empty slices.
    pub fn parse(payload: &'a [u8]) -> Self {
        let code = match payload.get(1..3) {
            Some(bytes) => u16::from_le_bytes([bytes[0], bytes[1]]),
            None => 0,
        };

        let (sql_state, message) = if payload.get(3) == Some(&markers::SQL_STATE) {
            (
                payload.get(4..ERR_MESSAGE_OFFSET).unwrap_or(&[]),
                payload.get(ERR_MESSAGE_OFFSET..).unwrap_or(&[]),
            )
        } else {
            (&[][..], payload.get(3..).unwrap_or(&[]))
        };

        Self {
            code,
            sql_state,
            message,
        }
    }

    /// Message as text (lossy)
    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(self.message).into_owned()
    }

    /// SQLSTATE as text (lossy)
    pub fn sql_state_lossy(&self) -> String {
        String::from_utf8_lossy(self.sql_state).into_owned()
    }
}

/// Iterator over the complete packets of a buffer
#[derive(Debug, Clone)]
pub struct Packets<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Packets<'a> {
    /// Bytes not consumed by the packets yielded so far
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = DecodedPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        if rest.len() <= HEADER_LEN {
            return None;
        }

        let header = PacketHeader::parse(rest)?;
        let payload = rest.get(HEADER_LEN..header.packet_len())?;
        self.pos += header.packet_len();

        Some(DecodedPacket {
            sequence: header.sequence,
            payload_len: header.payload_len,
            kind: PacketKind::classify(payload),
            payload,
        })
    }
}

/// Decode the complete packets in `buf`
pub fn decode_packets(buf: &[u8]) -> Packets<'_> {
    Packets { buf, pos: 0 }
}

/// Human readable summary of the packets in `buf`, one line per packet.
///
/// ```text
/// Packet no: 1, Payload len: 27, Command : ERR, Code: 1146, Message : Table 't1' missing
/// ```
pub fn describe_packets(buf: &[u8]) -> String {
    let mut out = String::new();

    for packet in decode_packets(buf) {
        if !out.is_empty() {
            out.push('\n');
        }

        out.push_str(&format!(
            "Packet no: {}, Payload len: {}",
            packet.sequence, packet.payload_len
        ));

        match packet.kind {
            PacketKind::Ok => out.push_str(", Command : OK"),
            PacketKind::Err => {
                let err = ErrorView::parse(packet.payload);
                out.push_str(&format!(
                    ", Command : ERR, Code: {}, Message : {}",
                    err.code,
                    err.message_lossy()
                ));
            }
            PacketKind::LocalInfileRequest => out.push_str(", Command : GET_MORE_CLIENT_DATA"),
            PacketKind::ResultSetOrOther => out.push_str(", Command : Result Set"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_packet(seq: u8, code: u16, state: &str, msg: &str) -> Vec<u8> {
        let mut payload = vec![markers::ERR];
        payload.extend_from_slice(&code.to_le_bytes());
        payload.push(b'#');
        payload.extend_from_slice(state.as_bytes());
        payload.extend_from_slice(msg.as_bytes());

        let mut packet = PacketHeader {
            payload_len: payload.len(),
            sequence: seq,
        }
        .to_bytes()
        .to_vec();
        packet.extend_from_slice(&payload);
        packet
    }

    #[test]
    fn test_single_ok_packet() {
        let buf = [3, 0, 0, 0, 0x00, 0x00, 0x00];
        let mut packets = decode_packets(&buf);

        let ok = packets.next().expect("one packet");
        assert_eq!(ok.kind, PacketKind::Ok);
        assert_eq!(ok.sequence, 0);
        assert_eq!(ok.payload_len, 3);
        assert!(packets.next().is_none());
        assert!(packets.remainder().is_empty());
    }

    #[test]
    fn test_truncated_trailing_header_is_not_decoded() {
        let mut buf = vec![3, 0, 0, 1, 0x00, 0x00, 0x00];
        buf.extend_from_slice(&[5, 0, 0]);

        let mut packets = decode_packets(&buf);
        assert_eq!(packets.next().map(|p| p.sequence), Some(1));
        assert!(packets.next().is_none());
        assert_eq!(packets.remainder(), &[5, 0, 0]);
    }

    #[test]
    fn test_truncated_payload_stops_cleanly() {
        // Header claims 10 bytes, only 2 present
        let buf = [10, 0, 0, 0, 0xff, 0x01];
        let mut packets = decode_packets(&buf);
        assert!(packets.next().is_none());
        assert_eq!(packets.remainder().len(), buf.len());
    }

    #[test]
    fn test_err_packet_fields() {
        let buf = err_packet(1, 1146, "42S02", "Table 'test.t1' doesn't exist");
        let packet = decode_packets(&buf).next().unwrap();
        assert_eq!(packet.kind, PacketKind::Err);

        let err = packet.error().unwrap();
        assert_eq!(err.code, 1146);
        assert_eq!(err.sql_state, b"42S02");
        assert_eq!(err.message_lossy(), "Table 'test.t1' doesn't exist");
    }

    #[test]
    fn test_short_err_payload_does_not_panic() {
        let buf = [2, 0, 0, 0, 0xff, 0x10];
        let packet = decode_packets(&buf).next().unwrap();
        let err = packet.error().unwrap();
        assert_eq!(err.code, 0);
        assert!(err.message.is_empty());
    }

    #[test]
    fn test_classification_of_multiple_packets() {
        let mut buf = vec![1, 0, 0, 1, 0x02];
        buf.extend_from_slice(&[5, 0, 0, 2, 0xfb, b'/', b't', b'm', b'p']);
        buf.extend_from_slice(&[7, 0, 0, 3, 0x00, 0, 0, 2, 0, 0, 0]);

        let kinds: Vec<_> = decode_packets(&buf).map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PacketKind::ResultSetOrOther,
                PacketKind::LocalInfileRequest,
                PacketKind::Ok
            ]
        );
    }

    #[test]
    fn test_describe_packets() {
        let mut buf = vec![3, 0, 0, 0, 0x00, 0x00, 0x00];
        buf.extend(err_packet(1, 1064, "42000", "syntax error"));

        let text = describe_packets(&buf);
        assert_eq!(
            text,
            "Packet no: 0, Payload len: 3, Command : OK\n\
             Packet no: 1, Payload len: 21, Command : ERR, Code: 1064, Message : syntax error"
        );
    }

    #[test]
    fn test_header_round_trip() {
        let header = PacketHeader {
            payload_len: 0x12_3456,
            sequence: 7,
        };
        assert_eq!(PacketHeader::parse(&header.to_bytes()), Some(header));
    }
}
