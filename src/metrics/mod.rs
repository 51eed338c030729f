//! Metrics emitted through the `metrics` facade.
//!
//! The crate never installs a recorder; without one every call is a no-op.
//! Applications that want the numbers install an exporter of their choice.

/// Label values
pub mod labels {
    /// Connection opened
    pub const RESULT_OK: &str = "ok";
    /// Transport unreachable
    pub const RESULT_UNREACHABLE: &str = "unreachable";
    /// Reachable but not encrypted although TLS is configured
    pub const RESULT_TLS_VIOLATION: &str = "tls_violation";
    /// Handshake rejected or failed
    pub const RESULT_REJECTED: &str = "rejected";

    /// Query succeeded
    pub const STATUS_OK: &str = "ok";
    /// Query failed terminally
    pub const STATUS_ERROR: &str = "error";
    /// Query gave up on transient failures
    pub const STATUS_EXHAUSTED: &str = "exhausted";
}

/// Counters
pub mod counters {
    /// Connection attempt finished with `result`
    pub fn connect_completed(result: &'static str) {
        ::metrics::counter!("backend_connect_total", "result" => result).increment(1);
    }

    /// Primary port failed and the extra port was tried
    pub fn extra_port_fallback() {
        ::metrics::counter!("backend_extra_port_fallback_total").increment(1);
    }

    /// Session opened without encryption although TLS is configured
    pub fn tls_policy_violation() {
        ::metrics::counter!("backend_tls_policy_violation_total").increment(1);
    }

    /// Query finished with `status`
    pub fn query_completed(status: &'static str) {
        ::metrics::counter!("backend_query_total", "status" => status).increment(1);
    }

    /// Query retried after a transient failure
    pub fn query_retried() {
        ::metrics::counter!("backend_query_retries_total").increment(1);
    }
}

/// Histograms
pub mod histograms {
    /// Time spent opening a backend connection
    pub fn connect_duration(duration_ms: u64) {
        ::metrics::histogram!("backend_connect_duration_ms").record(duration_ms as f64);
    }

    /// Time spent executing a query, retries included
    pub fn query_duration(duration_ms: u64) {
        ::metrics::histogram!("backend_query_duration_ms").record(duration_ms as f64);
    }
}
