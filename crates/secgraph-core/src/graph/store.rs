//! Graph store adapter trait
//!
//! All graph access in the engine goes through [`GraphStore`], so the
//! retrieval pipeline never depends on a concrete backend. Probing calls
//! are Ok-shaped: a missing node is `Ok(None)`, an empty search is an
//! empty vec. Only infrastructure failures become errors.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;
use crate::graph::{Edge, Node, NodeType, Relation};

/// Maximum attempts for a retried store call
const MAX_STORE_ATTEMPTS: u32 = 3;

/// Base delay for store retry backoff (in milliseconds)
const STORE_BACKOFF_BASE_MS: u64 = 100;

/// Traversal direction for neighbor queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges from source to target
    Outgoing,
    /// Follow edges from target to source
    Incoming,
    /// Follow edges in both directions
    Both,
}

/// Aggregate graph statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphStats {
    /// Node counts keyed by node type string
    pub nodes_by_type: std::collections::BTreeMap<String, i64>,
    /// Total node count
    pub node_count: i64,
    /// Total edge count
    pub edge_count: i64,
}

/// Typed adapter over the knowledge graph backend
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Case-insensitive substring search over label, description, tags and
    /// category, optionally restricted to one node type. Deterministic order.
    async fn find_by_label(&self, text: &str, node_type: Option<&NodeType>) -> Result<Vec<Node>>;

    /// Look up a node by id. Absence is `Ok(None)`, not an error.
    async fn find_by_id(&self, id: &str) -> Result<Option<Node>>;

    /// All nodes of one type. Deterministic order.
    async fn find_by_type(&self, node_type: &NodeType) -> Result<Vec<Node>>;

    /// Edges incident to a node together with the node on the far end,
    /// optionally filtered by relation. Deterministic order.
    async fn neighbors(
        &self,
        id: &str,
        relations: Option<&[Relation]>,
        direction: Direction,
    ) -> Result<Vec<(Edge, Node)>>;

    /// Insert or update a node (write surface for ingestion and tests)
    async fn save_node(&self, node: &Node) -> Result<()>;

    /// Insert or update an edge; both endpoints must already exist
    async fn save_edge(&self, edge: &Edge) -> Result<()>;

    /// Aggregate counts
    async fn stats(&self) -> Result<GraphStats>;

    /// Monotonic write-generation counter, bumped on every save.
    /// Cached retrieval results are only valid while this is unchanged.
    fn generation(&self) -> u64;
}

/// Run a store call with bounded retry
///
/// Transient failures are retried up to three attempts with exponential
/// backoff; the typed error from the final attempt is surfaced unchanged.
pub async fn with_retry<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempts < MAX_STORE_ATTEMPTS => {
                let backoff = STORE_BACKOFF_BASE_MS * 2u64.pow(attempts - 1);
                warn!(
                    attempt = attempts,
                    wait_ms = backoff,
                    error = %e,
                    "Store call failed, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
