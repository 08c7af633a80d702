//! Cluster: the root handle owning the transport session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use couchbase_core::{CouchbaseError, Result, Transcoder};

use crate::bucket::Bucket;
use crate::config::{ClusterOptions, ConnectionString};
use crate::connection::TransportSession;
use crate::dispatch::Dispatcher;
use crate::management::query_index::QueryIndexManager;
use crate::management::search_index::SearchIndexManager;
use crate::management::user::UserManager;
use crate::query::analytics::{AnalyticsOptions, AnalyticsResult};
use crate::query::search::{SearchOptions, SearchQuery, SearchResult};
use crate::query::{QueryOptions, QueryResult, QueryService};

/// Everything the addressing hierarchy shares: options, session,
/// dispatcher, and the process-default transcoder. Only the cluster level
/// owns connections; buckets, scopes and collections hold references.
pub(crate) struct ClientCore {
    pub(crate) options: Arc<ClusterOptions>,
    pub(crate) session: Arc<TransportSession>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) transcoder: Transcoder,
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore").finish_non_exhaustive()
    }
}

/// The entry point for talking to a cluster.
///
/// # Example
///
/// ```ignore
/// use couchbase_client::{Cluster, ClusterOptions};
///
/// let options = ClusterOptions::builder()
///     .credentials("Administrator", "password")
///     .connector(my_transport_connector)
///     .build()?;
/// let cluster = Cluster::connect("couchbase://10.0.0.1", options).await?;
///
/// let collection = cluster.bucket("travel").default_collection();
/// collection
///     .upsert("airline_10", serde_json::json!({"name": "40-Mile Air"}), Default::default())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Cluster {
    core: Arc<ClientCore>,
    buckets: Arc<StdMutex<HashMap<String, Bucket>>>,
}

impl Cluster {
    /// Connects to a cluster.
    ///
    /// Parses the connection string (its parameters override `options`),
    /// establishes the transport session through the configured connector,
    /// and starts the operation dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the connection string is
    /// malformed or no connector is configured, `Authentication` when the
    /// cluster rejects the credentials, and `Network`/`Timeout` when no node
    /// is reachable.
    pub async fn connect(connection_string: &str, options: ClusterOptions) -> Result<Cluster> {
        let parsed = ConnectionString::parse(connection_string)?;
        let mut options = options;
        parsed.apply(&mut options)?;

        let connector = options.connector().cloned().ok_or_else(|| {
            CouchbaseError::InvalidConfiguration(
                "no transport connector configured".to_string(),
            )
        })?;

        let options = Arc::new(options);
        let session =
            TransportSession::new(Arc::clone(&options), connector, parsed.endpoints().to_vec());
        session.start().await?;

        let dispatcher = Dispatcher::new(Arc::clone(&session), Arc::clone(&options));
        dispatcher.start()?;

        tracing::info!(
            endpoints = parsed.endpoints().len(),
            tls = parsed.is_tls(),
            "connected to cluster"
        );

        let transcoder =
            Transcoder::from_config(options.encoder().clone(), *options.decoder());

        Ok(Cluster {
            core: Arc::new(ClientCore {
                options,
                session,
                dispatcher,
                transcoder,
            }),
            buckets: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    /// Returns a bucket handle.
    ///
    /// Buckets are looked up lazily and cached: the same name always yields
    /// the same logical handle for the life of the process.
    pub fn bucket(&self, name: &str) -> Bucket {
        if let Ok(buckets) = self.buckets.lock() {
            if let Some(existing) = buckets.get(name) {
                return existing.clone();
            }
        }

        let bucket = Bucket::new(name.to_string(), Arc::clone(&self.core));

        if let Ok(mut buckets) = self.buckets.lock() {
            return buckets.entry(name.to_string()).or_insert(bucket).clone();
        }
        bucket
    }

    /// Executes a N1QL query.
    pub async fn query(&self, statement: &str, options: QueryOptions) -> Result<QueryResult> {
        QueryService::new(Arc::clone(&self.core))
            .query(statement, options)
            .await
    }

    /// Executes an analytics query.
    pub async fn analytics_query(
        &self,
        statement: &str,
        options: AnalyticsOptions,
    ) -> Result<AnalyticsResult> {
        QueryService::new(Arc::clone(&self.core))
            .analytics_query(statement, options)
            .await
    }

    /// Executes a full-text search query against a search index.
    pub async fn search_query(
        &self,
        index_name: &str,
        query: SearchQuery,
        options: SearchOptions,
    ) -> Result<SearchResult> {
        QueryService::new(Arc::clone(&self.core))
            .search_query(index_name, query, options)
            .await
    }

    /// Returns the query index management interface.
    pub fn query_indexes(&self) -> QueryIndexManager {
        QueryIndexManager::new(Arc::clone(&self.core))
    }

    /// Returns the search index management interface.
    pub fn search_indexes(&self) -> SearchIndexManager {
        SearchIndexManager::new(Arc::clone(&self.core))
    }

    /// Returns the user management interface.
    pub fn users(&self) -> UserManager {
        UserManager::new(Arc::clone(&self.core))
    }

    /// Returns the cluster options this client runs with.
    pub fn options(&self) -> &ClusterOptions {
        &self.core.options
    }

    /// Returns the number of open connections in the pool.
    pub async fn connection_count(&self) -> usize {
        self.core.session.connection_count().await
    }

    /// Disconnects from the cluster, releasing all pooled connections.
    ///
    /// After disconnecting, the handle cannot be used for any operations.
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!("disconnecting from cluster");
        self.core.session.shutdown().await
    }
}
