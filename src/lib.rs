//! Backend connectivity and wire protocol layer for a MariaDB/MySQL proxy.
//!
//! The crate covers the path from configuration text to a live, policy-checked
//! backend session:
//!
//! * [`host`] parses and classifies configured addresses
//! * [`protocol`] frames and decodes wire packets
//! * [`identifier`] dequotes identifiers and translates `LIKE` patterns
//! * [`connection`] opens backend sessions, enforcing TLS and port fallback
//! * [`query`] runs queries under a bounded retry policy
//!
//! ```no_run
//! # async fn example() -> proxy_backend::Result<()> {
//! use proxy_backend::connection::{
//!     Backend, ConnectionEstablisher, ConnectionSettings, Credentials,
//! };
//! use proxy_backend::query::QueryExecutor;
//!
//! let settings = ConnectionSettings::builder().build();
//! let establisher = ConnectionEstablisher::new(settings.clone())?;
//!
//! let backend = Backend::new("server1", "127.0.0.1:3306".parse().unwrap());
//! let credentials = Credentials::new("maxuser").password("secret");
//!
//! let mut conn = establisher.connect(&backend, &credentials).await?;
//! let executor = QueryExecutor::new(&settings);
//! match executor.execute(&mut conn, "SELECT @@version").await {
//!     Ok(rows) => println!("{} column(s)", rows.columns().len()),
//!     Err(e) => eprintln!("{} ({})", e, e.code),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod connection;
pub mod error;
pub mod host;
pub mod identifier;
pub mod metrics;
pub mod protocol;
pub mod query;

pub use error::{Error, Result};
pub use host::{Host, HostType};
