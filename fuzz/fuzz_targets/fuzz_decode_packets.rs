#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use proxy_backend::protocol::decode::decode_packet;
use proxy_backend::protocol::{decode_packets, describe_packets};

fuzz_target!(|data: &[u8]| {
    // The borrowed walker and the describer must never read past the buffer
    for packet in decode_packets(data) {
        let _ = packet.error();
    }
    let _ = describe_packets(data);

    // Feed the buffer in a loop to simulate several packets arriving
    // in a single TCP segment.
    let mut buf = BytesMut::from(data);
    while !buf.is_empty() {
        match decode_packet(&buf) {
            Ok((_, consumed)) => {
                let _ = buf.split_to(consumed);
            }
            Err(_) => break,
        }
    }
});
