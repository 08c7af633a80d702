//! Async Rust client core for Couchbase-compatible document stores.
//!
//! This crate implements the client side of a distributed document store:
//! connection/session management, operation dispatch with correlation-id
//! tracking, document transcoding, result/error mapping, and the
//! Cluster → Bucket → Scope → Collection addressing hierarchy. It is built
//! on [Tokio](https://tokio.rs/) and exposes every operation as an `async fn`.
//!
//! The wire protocol is deliberately not here: the client talks to the
//! cluster through the [`transport::Transport`] and [`transport::Connector`]
//! seams, which a transport crate implements with real framing, TLS, and
//! topology handling.
//!
//! # Quick Start
//!
//! ```ignore
//! use couchbase_client::{Cluster, ClusterOptions};
//! use serde_json::json;
//!
//! let options = ClusterOptions::builder()
//!     .credentials("Administrator", "password")
//!     .connector(transport_connector)
//!     .build()?;
//! let cluster = Cluster::connect("couchbase://10.0.0.1", options).await?;
//!
//! let collection = cluster.bucket("travel").default_collection();
//! collection.upsert("airline_10", json!({"name": "40-Mile Air"}), Default::default()).await?;
//! let doc = collection.get("airline_10", Default::default()).await?;
//! println!("{:?} @ {}", doc.content(), doc.cas());
//!
//! cluster.disconnect().await?;
//! ```
//!
//! # Services
//!
//! | Surface | Obtain via | Description |
//! |---------|-----------|-------------|
//! | [`Collection`] | [`Bucket::default_collection`] / [`Scope::collection`] | Key-value and sub-document operations |
//! | [`BinaryCollection`] | [`Collection::binary`] | Raw append/prepend and counters |
//! | [`query::QueryService`] | [`Cluster::query`] | N1QL queries with `MutationState` consistency |
//! | [`management::query_index::QueryIndexManager`] | [`Cluster::query_indexes`] | Index administration |
//! | [`management::user::UserManager`] | [`Cluster::users`] | Users, roles, groups |

#![warn(missing_docs)]

pub mod bucket;
pub mod cluster;
pub mod collection;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod dispatch;
pub mod management;
pub mod options;
pub mod query;
pub mod results;
pub mod scope;
pub mod subdoc;
pub mod transport;

pub use bucket::Bucket;
pub use cluster::Cluster;
pub use collection::{BinaryCollection, Collection};
pub use config::{
    ClusterOptions, ClusterOptionsBuilder, ConnectionString, Credentials, LogLevel,
};
pub use results::{
    CounterResult, ExistsResult, GetResult, LookupInResult, MutateInResult, MutationResult,
};
pub use scope::Scope;
pub use subdoc::{LookupInSpec, MutateInSpec};

pub use couchbase_core::{
    Cas, CouchbaseError, DurabilityLevel, ErrorContext, Keyspace, MutationState, MutationToken,
    Result, StoreSemantics, Transcoder,
};
