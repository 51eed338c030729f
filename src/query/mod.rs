//! Query execution with bounded retry

mod executor;
mod result;

pub use executor::QueryExecutor;
pub use result::{QueryError, ResultSet, Row};
