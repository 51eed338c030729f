//! Query executor

use super::result::{QueryError, ResultSet};
use crate::connection::{BackendConnection, ConnectionSettings, Connector, RetryPolicy};
use crate::metrics::{counters, histograms, labels};
use crate::Error;
use std::time::Instant;
use tracing::Instrument;

/// Runs queries on a backend connection, retrying transient failures.
///
/// Only connectivity faults are retried; a statement the server rejects fails
/// on the first attempt. Retries stop when either `max_retries` is used up or
/// the policy timeout has elapsed, whichever comes first.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    retry: RetryPolicy,
}

impl QueryExecutor {
    /// Executor using the settings' retry policy
    pub fn new(settings: &ConnectionSettings) -> Self {
        Self::with_policy(settings.retry())
    }

    /// Executor with an explicit retry policy
    pub fn with_policy(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Retry policy in effect
    pub fn policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execute `sql` and fetch its result.
    ///
    /// On failure the error carries `"Query '<sql>' failed: '<server message>'"`
    /// and the server (or client) error code.
    pub async fn execute<C: Connector>(
        &self,
        conn: &mut BackendConnection<C>,
        sql: &str,
    ) -> Result<ResultSet, QueryError> {
        let span = tracing::info_span!("execute", server = %conn.backend().name());
        async {
            let start = Instant::now();
            let outcome = self.execute_with_retry(conn, sql, start).await;
            histograms::query_duration(start.elapsed().as_millis() as u64);

            match outcome {
                Ok(rows) => {
                    counters::query_completed(labels::STATUS_OK);
                    Ok(rows)
                }
                Err(e) => {
                    let status = if e.is_transient() {
                        labels::STATUS_EXHAUSTED
                    } else {
                        labels::STATUS_ERROR
                    };
                    counters::query_completed(status);

                    let err = QueryError {
                        message: format!("Query '{}' failed: '{}'", sql, e.server_message()),
                        code: e.code(),
                    };
                    tracing::warn!(code = err.code, "{}", err.message);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_with_retry<C: Connector>(
        &self,
        conn: &mut BackendConnection<C>,
        sql: &str,
        start: Instant,
    ) -> crate::Result<ResultSet> {
        let deadline = start + self.retry.timeout;
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let bounded = tokio::time::timeout(remaining, conn.query(sql)).await;
            let result = match bounded {
                Ok(result) => result,
                Err(_) => {
                    // The exchange was abandoned part way through
                    conn.discard();
                    Err(Error::Timeout(self.retry.timeout))
                }
            };

            match result {
                Ok(rows) => return Ok(rows),
                Err(e)
                    if e.is_transient()
                        && attempt < self.retry.max_retries
                        && Instant::now() < deadline =>
                {
                    attempt += 1;
                    counters::query_retried();
                    tracing::debug!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %e,
                        "transient query failure, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
