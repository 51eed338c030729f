//! Network address parsing and classification
//!
//! A [`Host`] is built from free-form configuration text such as
//! `127.0.0.1:3306`, `[::1]:4000`, `db.example.com:3306` or
//! `/var/run/mysqld/mysqld.sock`. Parsing never fails: input that cannot be
//! classified yields a [`HostType::Invalid`] host that still carries the
//! original text and whatever partial address/port was recognised.
//!
//! The validators are deliberately shallow. They check that a string *could*
//! be an address of a given kind, not that it resolves or is in range
//! (`999.1.1.1` passes the IPv4 check).
//!
//! # Examples
//!
//! ```
//! use proxy_backend::{Host, HostType};
//!
//! let host = Host::parse("[::1]:4000");
//! assert_eq!(host.host_type(), HostType::Ipv6);
//! assert_eq!(host.address(), "::1");
//! assert_eq!(host.port(), Some(4000));
//! assert_eq!(host.to_string(), "[::1]:4000");
//!
//! // A port is required for everything but unix sockets
//! assert_eq!(Host::parse("dbhost").host_type(), HostType::Invalid);
//! ```

use crate::identifier::is_space;
use std::convert::Infallible;
use std::ffi::CStr;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Port value recorded when the port text is present but not numeric
pub const NON_NUMERIC_PORT: i32 = -1;

/// Buffer size for reverse lookups; names of 128 bytes or more are not returned
const MAX_HOSTNAME_BUF: usize = 128;

/// Classification of a parsed address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    /// Could not be classified
    Invalid,
    /// Absolute path of a unix domain socket
    UnixDomainSocket,
    /// DNS name
    HostName,
    /// Dotted quad
    Ipv4,
    /// IPv6 literal
    Ipv6,
}

impl HostType {
    /// Display name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            HostType::Invalid => "Invalid",
            HostType::UnixDomainSocket => "UnixDomainSocket",
            HostType::HostName => "HostName",
            HostType::Ipv4 => "IPV4",
            HostType::Ipv6 => "IPV6",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed and classified network endpoint. Immutable once built.
#[derive(Debug, Clone)]
pub struct Host {
    original: String,
    address: String,
    port: Option<i32>,
    host_type: HostType,
}

impl Host {
    /// Parse free-form address text.
    ///
    /// Accepted forms: `host:port`, `ipv4:port`, `[ipv6]:port`, a bare IPv6
    /// literal and `/absolute/socket/path`. Anything else (including a host
    /// without a port) is [`HostType::Invalid`].
    pub fn parse(input: &str) -> Host {
        let trimmed = input.trim_matches(is_space);
        let parts = split_address(trimmed);

        let host_type = match &parts {
            Some(parts) => classify(&parts.address, parts.port, parts.port_given),
            None => HostType::Invalid,
        };

        let (address, port) = match parts {
            Some(parts) => (parts.address, parts.port),
            None => (partial_address(trimmed), None),
        };

        Host {
            original: input.to_string(),
            address,
            port,
            host_type,
        }
    }

    /// Build a host from an already separated address and port.
    ///
    /// An empty address or one starting with `[` is left [`HostType::Invalid`].
    /// A socket path carries no port, so `port` is dropped for it.
    pub fn from_parts(address: impl Into<String>, port: i32) -> Host {
        let address = address.into();
        let host_type = if address.is_empty() || address.starts_with('[') {
            HostType::Invalid
        } else {
            classify(&address, Some(port), false)
        };

        let port = (host_type != HostType::UnixDomainSocket).then_some(port);

        Host {
            original: address.clone(),
            address,
            port,
            host_type,
        }
    }

    /// The unmodified input
    pub fn original_input(&self) -> &str {
        &self.original
    }

    /// Host name, IP literal (without brackets) or socket path
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Port, [`NON_NUMERIC_PORT`] if the port text was not numeric, `None` if absent
    pub fn port(&self) -> Option<i32> {
        self.port
    }

    /// Classification
    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    /// Whether the host was classified as anything but [`HostType::Invalid`]
    pub fn is_valid(&self) -> bool {
        self.host_type != HostType::Invalid
    }

    /// Whether the host is a unix domain socket path
    pub fn is_socket(&self) -> bool {
        self.host_type == HostType::UnixDomainSocket
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.port == other.port
            && self.host_type == other.host_type
    }
}

impl Eq for Host {}

impl FromStr for Host {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Host::parse(s))
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = self.port.unwrap_or_default();
        match self.host_type {
            HostType::Invalid => {
                write!(
                    f,
                    "INVALID input: '{}' parsed to {}:",
                    self.original, self.address
                )?;
                if let Some(port) = self.port {
                    write!(f, "{}", port)?;
                }
                Ok(())
            }
            HostType::UnixDomainSocket => f.write_str(&self.address),
            HostType::HostName | HostType::Ipv4 => write!(f, "{}:{}", self.address, port),
            HostType::Ipv6 => write!(f, "[{}]:{}", self.address, port),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Host {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Ok(Host::parse(&text))
    }
}

/// Result of splitting input that was consumed in full
struct Parts {
    address: String,
    port: Option<i32>,
    port_given: bool,
}

/// Split trimmed input into address and port. `None` if the input is empty
/// or not consumed in full (unclosed bracket, trailing text, dangling `:`).
fn split_address(input: &str) -> Option<Parts> {
    if input.is_empty() {
        return None;
    }

    let (address, port_text) = if let Some(rest) = input.strip_prefix('[') {
        let close = rest.find(']')?;
        let after = &rest[close + 1..];
        let port_text = match after.strip_prefix(':') {
            Some(port) if !port.is_empty() => Some(port),
            _ if after.is_empty() => None,
            _ => return None,
        };
        (&rest[..close], port_text)
    } else if is_valid_ipv6(input) {
        (input, None)
    } else {
        match input.split_once(':') {
            Some((_, "")) => return None,
            Some((address, port)) => (address, Some(port)),
            None => (input, None),
        }
    };

    let port = port_text.map(|text| {
        if text.bytes().all(|b| b.is_ascii_digit()) {
            text.parse::<i32>().unwrap_or(NON_NUMERIC_PORT)
        } else {
            NON_NUMERIC_PORT
        }
    });

    Some(Parts {
        address: address.to_string(),
        port,
        port_given: port_text.is_some(),
    })
}

/// Best-effort address for input that could not be split
fn partial_address(input: &str) -> String {
    if let Some(rest) = input.strip_prefix('[') {
        match rest.find(']') {
            Some(close) => rest[..close].to_string(),
            None => rest.to_string(),
        }
    } else {
        match input.split_once(':') {
            Some((address, _)) => address.to_string(),
            None => input.to_string(),
        }
    }
}

fn classify(address: &str, port: Option<i32>, port_given: bool) -> HostType {
    if is_valid_socket(address) {
        if port_given {
            HostType::Invalid
        } else {
            HostType::UnixDomainSocket
        }
    } else if port.is_some_and(is_valid_port) {
        if is_valid_ipv4(address) {
            HostType::Ipv4
        } else if is_valid_ipv6(address) {
            HostType::Ipv6
        } else if is_valid_hostname(address) {
            HostType::HostName
        } else {
            HostType::Invalid
        }
    } else {
        HostType::Invalid
    }
}

/// Digits and dots only, 7 to 15 characters, exactly three dots
pub fn is_valid_ipv4(ip: &str) -> bool {
    ip.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && (7..=15).contains(&ip.len())
        && ip.bytes().filter(|&b| b == b'.').count() == 3
}

/// At least two colons, only hex digits, colons and dots, 2 to 45 characters
pub fn is_valid_ipv6(ip: &str) -> bool {
    ip.bytes().filter(|&b| b == b':').count() >= 2
        && ip
            .bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.')
        && (2..=45).contains(&ip.len())
}

/// Alphanumerics, `_` and `.`, not starting with `_`, 1 to 253 characters
pub fn is_valid_hostname(name: &str) -> bool {
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        && !name.starts_with('_')
        && (1..=253).contains(&name.len())
}

/// Starts with `/` and does not end with `/`
pub fn is_valid_socket(address: &str) -> bool {
    address.starts_with('/') && !address.ends_with('/')
}

/// Strictly between 0 and 65536
pub fn is_valid_port(port: i32) -> bool {
    0 < port && port < (1 << 16)
}

/// Resolve an IP literal to a host name.
///
/// Only IPv4/IPv6 shaped input is looked up, and the lookup must produce a
/// name (numeric results are refused). Names that do not fit in 127 bytes
/// are treated as a failed lookup.
pub fn reverse_dns(ip: &str) -> Option<String> {
    let addr = if is_valid_ipv4(ip) {
        IpAddr::V4(ip.parse::<Ipv4Addr>().ok()?)
    } else if is_valid_ipv6(ip) {
        IpAddr::V6(ip.parse::<Ipv6Addr>().ok()?)
    } else {
        return None;
    };

    let name = lookup_name(addr);
    if name.is_none() {
        tracing::debug!(ip, "reverse name lookup failed");
    }
    name
}

fn lookup_name(addr: IpAddr) -> Option<String> {
    // SAFETY: sockaddr_storage is plain old data; all-zero is a valid value.
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

    let len = match addr {
        IpAddr::V4(v4) => {
            // SAFETY: sockaddr_storage is large and aligned enough for any sockaddr.
            let sin = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in)
            };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.octets());
            std::mem::size_of::<libc::sockaddr_in>()
        }
        IpAddr::V6(v6) => {
            // SAFETY: as above.
            let sin6 = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6)
            };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_addr.s6_addr = v6.octets();
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };

    let mut host: Vec<libc::c_char> = vec![0; MAX_HOSTNAME_BUF];

    // SAFETY: `storage` holds an initialised sockaddr of `len` bytes and `host`
    // is a writable buffer of `host.len()` bytes.
    let rc = unsafe {
        libc::getnameinfo(
            &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
            len as libc::socklen_t,
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };

    if rc != 0 {
        return None;
    }

    debug_assert!(host.contains(&0));
    // SAFETY: getnameinfo NUL-terminates the name within the buffer on success.
    let name = unsafe { CStr::from_ptr(host.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}
