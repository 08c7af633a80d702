//! Health reports: ping (active round trips) and diagnostics (passive pool
//! state).

use std::time::Duration;

/// State of a pinged endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingState {
    /// The endpoint answered within the deadline.
    Ok,
    /// The ping timed out.
    Timeout,
    /// The ping failed with a transport error.
    Error,
}

/// One endpoint's entry in a ping report.
#[derive(Debug, Clone)]
pub struct EndpointPingReport {
    /// The node address.
    pub endpoint: String,
    /// Round-trip latency, when the ping completed.
    pub latency: Option<Duration>,
    /// Outcome of the ping.
    pub state: PingState,
}

/// Result of actively probing the cluster.
#[derive(Debug, Clone)]
pub struct PingReport {
    /// Caller-provided or generated report id.
    pub id: String,
    /// Per-endpoint results for the key-value service.
    pub endpoints: Vec<EndpointPingReport>,
}

impl PingReport {
    /// Returns true if every probed endpoint answered.
    pub fn all_ok(&self) -> bool {
        self.endpoints.iter().all(|e| e.state == PingState::Ok)
    }
}

/// One pooled connection's entry in a diagnostics report.
#[derive(Debug, Clone)]
pub struct EndpointDiagnostics {
    /// The connection identifier.
    pub connection_id: String,
    /// The node address.
    pub endpoint: String,
    /// How long the connection has carried no traffic.
    pub last_activity: Duration,
    /// Requests currently awaiting responses on this connection.
    pub in_flight: usize,
}

/// Passive snapshot of the connection pool; performs no network traffic.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    /// Caller-provided or generated report id.
    pub id: String,
    /// Per-connection state.
    pub connections: Vec<EndpointDiagnostics>,
}
