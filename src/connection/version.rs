//! Server version and flavour

/// Prefix MariaDB 10+ puts in front of its version for old replication clients
const MARIADB_RPL_PREFIX: &str = "5.5.5-";

/// Server flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// MariaDB
    MariaDb,
    /// MySQL (or anything not recognised as another flavour)
    MySql,
    /// Clustrix / Xpand
    Clustrix,
}

/// Parsed server version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    /// `major * 10000 + minor * 100 + patch`
    pub total: u64,
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Version string as sent by the server
    pub string: String,
}

impl ServerVersion {
    /// Parse a version string such as `10.5.8-MariaDB-log`.
    ///
    /// Missing or non-numeric components count as zero.
    pub fn parse(version: &str) -> Self {
        let numeric = version.strip_prefix(MARIADB_RPL_PREFIX).unwrap_or(version);

        let mut parts = numeric
            .split(|c: char| !c.is_ascii_digit())
            .take(3)
            .map(|p| p.parse::<u32>().unwrap_or(0));

        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);

        Self {
            total: u64::from(major) * 10_000 + u64::from(minor) * 100 + u64::from(patch),
            major,
            minor,
            patch,
            string: version.to_string(),
        }
    }

    /// Server flavour inferred from the version string
    pub fn server_type(&self) -> ServerType {
        let lower = self.string.to_ascii_lowercase();
        if lower.contains("clustrix") || lower.contains("xpand") {
            ServerType::Clustrix
        } else if lower.contains("mariadb") {
            ServerType::MariaDb
        } else {
            ServerType::MySql
        }
    }
}

impl Default for ServerVersion {
    fn default() -> Self {
        Self::parse("")
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}
