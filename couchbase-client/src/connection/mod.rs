//! Connection pooling and session lifecycle.

#[allow(clippy::module_inception)]
mod connection;
mod manager;

pub use connection::{Connection, ConnectionId};
pub use manager::{ConnectionEvent, TransportSession};
