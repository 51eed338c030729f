//! Authentication plugins

pub mod scramble;

/// `caching_sha2_password` status bytes sent after `0x01`
pub mod caching_sha2 {
    /// Password found in the server cache
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Server needs the full password
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Supported authentication plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    /// `mysql_native_password`
    NativePassword,
    /// `caching_sha2_password`
    CachingSha2Password,
    /// `mysql_clear_password`
    ClearPassword,
}

impl AuthPlugin {
    /// Look up a plugin by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mysql_native_password" => Some(Self::NativePassword),
            "caching_sha2_password" => Some(Self::CachingSha2Password),
            "mysql_clear_password" => Some(Self::ClearPassword),
            _ => None,
        }
    }

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Self::NativePassword => "mysql_native_password",
            Self::CachingSha2Password => "caching_sha2_password",
            Self::ClearPassword => "mysql_clear_password",
        }
    }

    /// Whether the response exposes the password and therefore requires TLS
    pub fn sends_cleartext(self) -> bool {
        matches!(self, Self::ClearPassword)
    }

    /// Response to send for `password` given the server `scramble`
    pub fn respond(self, password: &str, scramble: &[u8]) -> Vec<u8> {
        match self {
            Self::NativePassword => scramble::native_password(password, scramble),
            Self::CachingSha2Password => scramble::caching_sha2_password(password, scramble),
            Self::ClearPassword => scramble::clear_password(password),
        }
    }
}
