//! Basic key-value usage against an in-process transport.
//!
//! Run with: `cargo run --example kv_basics`
//!
//! Production deployments plug a real TCP/TLS transport crate into the
//! `Connector` seam; this example wires in a tiny in-memory store so the
//! client API can be exercised without a cluster.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use couchbase_client::config::Credentials;
use couchbase_client::options::{GetOptions, RemoveOptions, UpsertOptions};
use couchbase_client::transport::{Connector, Endpoint, Transport};
use couchbase_client::{Cas, Cluster, ClusterOptions, CouchbaseError};
use couchbase_core::protocol::Status;
use couchbase_core::{KvRequest, KvResponse, OpCode, Result};

struct MiniNode {
    docs: Mutex<HashMap<String, (Vec<u8>, u32, u64)>>,
    cas: AtomicU64,
}

impl MiniNode {
    fn handle(&self, request: KvRequest) -> KvResponse {
        let mut docs = self.docs.lock().expect("store lock");
        let id = request.correlation_id;
        match request.opcode {
            OpCode::Get => match docs.get(&request.key) {
                Some((value, flags, cas)) => {
                    let mut response = KvResponse::ok(id);
                    response.value = Some(value.clone().into());
                    response.flags = *flags;
                    response.cas = Cas(*cas);
                    response
                }
                None => KvResponse::with_status(id, Status::NotFound),
            },
            OpCode::Upsert => {
                let cas = self.cas.fetch_add(1, Ordering::SeqCst);
                docs.insert(
                    request.key.clone(),
                    (
                        request.value.unwrap_or_default().to_vec(),
                        request.flags,
                        cas,
                    ),
                );
                let mut response = KvResponse::ok(id);
                response.cas = Cas(cas);
                response
            }
            OpCode::Remove => match docs.remove(&request.key) {
                Some(_) => KvResponse::ok(id),
                None => KvResponse::with_status(id, Status::NotFound),
            },
            _ => KvResponse::with_status(id, Status::ServerError),
        }
    }
}

struct MiniTransport {
    node: Arc<MiniNode>,
    tx: mpsc::UnboundedSender<KvResponse>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<KvResponse>>,
}

impl fmt::Debug for MiniTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MiniTransport {
    async fn send(&self, request: KvRequest) -> Result<()> {
        let _ = self.tx.send(self.node.handle(request));
        Ok(())
    }

    async fn recv(&self) -> Result<Option<KvResponse>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MiniConnector {
    node: Arc<MiniNode>,
}

impl fmt::Debug for MiniNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniNode").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for MiniConnector {
    async fn connect(
        &self,
        _endpoint: &Endpoint,
        _credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(MiniTransport {
            node: Arc::clone(&self.node),
            tx,
            rx: AsyncMutex::new(rx),
        }))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let connector = MiniConnector {
        node: Arc::new(MiniNode {
            docs: Mutex::new(HashMap::new()),
            cas: AtomicU64::new(1),
        }),
    };

    let options = ClusterOptions::builder()
        .credentials("Administrator", "password")
        .connector(Arc::new(connector))
        .build()?;
    let cluster = Cluster::connect("couchbase://127.0.0.1", options).await?;
    println!(
        "connected with {} pooled connection(s)",
        cluster.connection_count().await
    );

    let collection = cluster.bucket("travel").default_collection();

    println!("\n--- upsert / get ---");
    let stored = collection
        .upsert(
            "airline_10",
            json!({"name": "40-Mile Air", "country": "United States"}),
            UpsertOptions::default(),
        )
        .await?;
    println!("stored airline_10 with cas {}", stored.cas());

    let fetched = collection.get("airline_10", GetOptions::default()).await?;
    println!("content: {:?}", fetched.content());

    println!("\n--- remove / not-found ---");
    collection
        .remove("airline_10", RemoveOptions::default())
        .await?;
    match collection.get("airline_10", GetOptions::default()).await {
        Err(CouchbaseError::KeyNotFound { key, .. }) => {
            println!("{key} is gone, as expected");
        }
        other => println!("unexpected outcome: {other:?}"),
    }

    cluster.disconnect().await?;
    Ok(())
}
