#![no_main]

use libfuzzer_sys::fuzz_target;
use proxy_backend::identifier::{pattern_to_matcher, trim_quotes, WildcardMode};
use proxy_backend::Host;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let host = Host::parse(text);
    assert_eq!(host.original_input(), text);
    let _ = host.to_string();

    let (inner, _) = trim_quotes(text);
    let matcher = pattern_to_matcher(inner, WildcardMode::Wildcard);
    assert!(matcher.pattern.len() <= 2 * inner.len());
});
