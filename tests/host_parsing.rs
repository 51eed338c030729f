//! Address parsing properties over representative configuration text

use proxy_backend::host::{is_valid_port, NON_NUMERIC_PORT};
use proxy_backend::identifier::{pattern_to_matcher, trim_quotes, WildcardMode};
use proxy_backend::{Host, HostType};

const ACCEPTED: &[(&str, HostType, &str, Option<i32>)] = &[
    ("127.0.0.1:3306", HostType::Ipv4, "127.0.0.1", Some(3306)),
    ("db1.example.com:4006", HostType::HostName, "db1.example.com", Some(4006)),
    ("[::1]:3306", HostType::Ipv6, "::1", Some(3306)),
    ("[fe80::1:2]:65535", HostType::Ipv6, "fe80::1:2", Some(65535)),
    ("/run/mysqld/mysqld.sock", HostType::UnixDomainSocket, "/run/mysqld/mysqld.sock", None),
];

const REJECTED: &[&str] = &[
    "",
    "   ",
    "dbhost",
    "127.0.0.1:",
    "127.0.0.1:0",
    "127.0.0.1:65536",
    "127.0.0.1:33o6",
    "[::1",
    "[::1]x",
    "[::1]:",
    "/tmp/mysql.sock:3306",
    "_underscore:3306",
    "db-1.example.com:3306",
];

#[test]
fn test_accepted_forms() {
    for (input, host_type, address, port) in ACCEPTED {
        let host = Host::parse(input);
        assert_eq!(host.host_type(), *host_type, "{}", input);
        assert_eq!(host.address(), *address, "{}", input);
        assert_eq!(host.port(), *port, "{}", input);
        assert!(host.is_valid());
    }
}

#[test]
fn test_rejected_forms_keep_original_text() {
    for input in REJECTED {
        let host = Host::parse(input);
        assert_eq!(host.host_type(), HostType::Invalid, "{}", input);
        assert_eq!(host.original_input(), *input);
        assert!(host.to_string().starts_with("INVALID input: '"), "{}", input);
    }
}

#[test]
fn test_display_round_trips_valid_hosts() {
    for (input, ..) in ACCEPTED {
        let host = Host::parse(input);
        let reparsed = Host::parse(&host.to_string());
        assert_eq!(reparsed, host, "{}", input);
    }

    for (address, port) in [
        ("10.0.0.7", 3307),
        ("::1", 3306),
        ("db1.example.com", 4006),
        ("/run/mysqld.sock", 3306),
    ] {
        let host = Host::from_parts(address, port);
        assert!(host.is_valid(), "{}", address);
        assert_eq!(Host::parse(&host.to_string()), host, "{}", address);
    }
}

#[test]
fn test_surrounding_whitespace_is_ignored() {
    let padded = Host::parse(" \t127.0.0.1:3306\n");
    assert_eq!(padded, Host::parse("127.0.0.1:3306"));
    assert_eq!(padded.original_input(), " \t127.0.0.1:3306\n");
}

#[test]
fn test_non_numeric_port_sentinel() {
    let host = Host::parse("db:http");
    assert_eq!(host.port(), Some(NON_NUMERIC_PORT));
    assert!(!is_valid_port(NON_NUMERIC_PORT));
}

#[test]
fn test_from_str_and_from_parts_agree() {
    let parsed: Host = "10.0.0.7:3307".parse().unwrap();
    assert_eq!(parsed, Host::from_parts("10.0.0.7", 3307));
    assert_eq!(Host::from_parts("::1", 3306).to_string(), "[::1]:3306");
}

#[test]
fn test_quoted_pattern_translation() {
    let (inner, ok) = trim_quotes("`shop%`");
    assert!(ok);
    let matcher = pattern_to_matcher(inner, WildcardMode::Wildcard);
    assert!(matcher.has_wildcard);
    assert_eq!(matcher.pattern, "shop.*");
}
