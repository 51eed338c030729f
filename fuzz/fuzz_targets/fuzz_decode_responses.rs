#![no_main]

use libfuzzer_sys::fuzz_target;
use proxy_backend::protocol::decode::{
    decode_auth_response, decode_column_count, decode_column_definition, decode_err,
    decode_greeting, decode_ok, decode_text_row,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_greeting(data);
    let _ = decode_auth_response(data);
    let _ = decode_ok(data);
    let _ = decode_err(data);
    let _ = decode_column_count(data);
    let _ = decode_column_definition(data);

    if let Some((&columns, row)) = data.split_first() {
        let _ = decode_text_row(row, usize::from(columns));
    }
});
