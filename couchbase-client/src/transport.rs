//! Transport seams.
//!
//! The wire-level protocol (binary framing, TLS and auth negotiation,
//! cluster topology) belongs to a lower transport library. The client core
//! sees it only through the [`Transport`] and [`Connector`] traits: opaque
//! framed request/response pairs keyed by correlation id.

use std::fmt;

use async_trait::async_trait;
use couchbase_core::{CouchbaseError, KvRequest, KvResponse, Result};

use crate::config::Credentials;

/// A cluster node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host` or `host:port`, using the given default port.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CouchbaseError::InvalidConfiguration(
                "empty host in connection string".to_string(),
            ));
        }
        match input.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    CouchbaseError::InvalidConfiguration(format!(
                        "invalid port in {input:?}"
                    ))
                })?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(input, default_port)),
        }
    }

    /// Returns the host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A framed, authenticated channel to one cluster node.
///
/// Implementations own request framing/deframing. `send` may be called from
/// many tasks concurrently; `recv` is only ever called by the connection's
/// receive loop.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Submits a framed request.
    async fn send(&self, request: KvRequest) -> Result<()>;

    /// Receives the next framed response.
    ///
    /// Returns `None` when the peer closes the channel cleanly.
    async fn recv(&self) -> Result<Option<KvResponse>>;

    /// Closes the channel.
    async fn close(&self) -> Result<()>;
}

/// Creates [`Transport`]s for cluster nodes.
///
/// This is where a real deployment plugs in its TCP/TLS implementation;
/// authentication happens inside `connect` using the supplied credentials.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Opens an authenticated transport to the given endpoint.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>>;
}
