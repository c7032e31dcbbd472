//! SQLite-backed graph store
//!
//! Nodes and edges live in two tables; properties are JSON text columns
//! queried through SQLite's json_extract. Writes are upserts so the
//! ingestion collaborator can re-import without conflicts.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::graph::store::{Direction, GraphStats, GraphStore};
use crate::graph::{Edge, Node, NodeType, Relation};
use crate::storage::Database;

/// SQLite implementation of [`GraphStore`]
#[derive(Clone)]
pub struct SqliteGraphStore {
    db: Database,
    generation: Arc<AtomicU64>,
}

impl SqliteGraphStore {
    /// Create a new store on top of an open database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn row_to_node(row: &SqliteRow) -> Result<Node> {
        let properties: String = row.get("properties");
        let properties = serde_json::from_str(&properties)?;
        Ok(Node {
            id: row.get("id"),
            node_type: NodeType::parse(row.get("node_type")),
            label: row.get("label"),
            properties,
        })
    }

    fn row_to_edge(row: &SqliteRow) -> Result<Edge> {
        let properties: Option<String> = row.get("edge_properties");
        let properties = match properties {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(Edge {
            source: row.get("source"),
            target: row.get("target"),
            relation: Relation::parse(row.get("relation")),
            properties,
        })
    }

    async fn neighbors_one_way(
        &self,
        id: &str,
        outgoing: bool,
    ) -> Result<Vec<(Edge, Node)>> {
        // Join on the far endpoint; ordering keeps traversal deterministic
        let sql = if outgoing {
            r#"
            SELECT e.source, e.target, e.relation, e.properties AS edge_properties,
                   n.id, n.node_type, n.label, n.properties
            FROM edges e JOIN nodes n ON n.id = e.target
            WHERE e.source = ?
            ORDER BY e.relation ASC, n.id ASC
            "#
        } else {
            r#"
            SELECT e.source, e.target, e.relation, e.properties AS edge_properties,
                   n.id, n.node_type, n.label, n.properties
            FROM edges e JOIN nodes n ON n.id = e.source
            WHERE e.target = ?
            ORDER BY e.relation ASC, n.id ASC
            "#
        };

        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(self.db.pool())
            .await
            .map_err(map_store_error)?;

        rows.iter()
            .map(|row| Ok((Self::row_to_edge(row)?, Self::row_to_node(row)?)))
            .collect()
    }
}

/// Map connection-level failures to `StoreUnavailable` so callers can
/// distinguish a down backend from a bad query
fn map_store_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            Error::StoreUnavailable(e.to_string())
        }
        other => Error::DatabaseError(other),
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn find_by_label(&self, text: &str, node_type: Option<&NodeType>) -> Result<Vec<Node>> {
        let pattern = format!("%{}%", text.to_lowercase());

        let rows = match node_type {
            Some(ty) => {
                sqlx::query(
                    r#"
                    SELECT id, node_type, label, properties FROM nodes
                    WHERE node_type = ?2 AND (
                        LOWER(label) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.description'), '')) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.tags'), '')) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.category'), '')) LIKE ?1
                    )
                    ORDER BY id ASC
                    "#,
                )
                .bind(&pattern)
                .bind(ty.as_str())
                .fetch_all(self.db.pool())
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, node_type, label, properties FROM nodes
                    WHERE LOWER(label) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.description'), '')) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.tags'), '')) LIKE ?1
                        OR LOWER(COALESCE(json_extract(properties, '$.category'), '')) LIKE ?1
                    ORDER BY id ASC
                    "#,
                )
                .bind(&pattern)
                .fetch_all(self.db.pool())
                .await
            }
        }
        .map_err(map_store_error)?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Node>> {
        let row = sqlx::query("SELECT id, node_type, label, properties FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(map_store_error)?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn find_by_type(&self, node_type: &NodeType) -> Result<Vec<Node>> {
        let rows = sqlx::query(
            "SELECT id, node_type, label, properties FROM nodes WHERE node_type = ? ORDER BY id ASC",
        )
        .bind(node_type.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(map_store_error)?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn neighbors(
        &self,
        id: &str,
        relations: Option<&[Relation]>,
        direction: Direction,
    ) -> Result<Vec<(Edge, Node)>> {
        let mut results = match direction {
            Direction::Outgoing => self.neighbors_one_way(id, true).await?,
            Direction::Incoming => self.neighbors_one_way(id, false).await?,
            Direction::Both => {
                let mut out = self.neighbors_one_way(id, true).await?;
                let incoming = self.neighbors_one_way(id, false).await?;
                // A self-loop appears in both queries; keep one copy
                for (edge, node) in incoming {
                    if !out.iter().any(|(e, _)| e.key() == edge.key()) {
                        out.push((edge, node));
                    }
                }
                out
            }
        };

        if let Some(wanted) = relations {
            results.retain(|(edge, _)| wanted.contains(&edge.relation));
        }

        Ok(results)
    }

    async fn save_node(&self, node: &Node) -> Result<()> {
        let properties = serde_json::to_string(&node.properties)?;

        sqlx::query(
            r#"
            INSERT INTO nodes (id, node_type, label, properties, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                node_type = excluded.node_type,
                label = excluded.label,
                properties = excluded.properties,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&node.id)
        .bind(node.node_type.as_str())
        .bind(&node.label)
        .bind(&properties)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await
        .map_err(map_store_error)?;

        self.bump_generation();
        Ok(())
    }

    async fn save_edge(&self, edge: &Edge) -> Result<()> {
        let properties = edge
            .properties
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO edges (source, target, relation, properties)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source, target, relation) DO UPDATE SET
                properties = excluded.properties
            "#,
        )
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(edge.relation.as_str())
        .bind(&properties)
        .execute(self.db.pool())
        .await
        .map_err(map_store_error)?;

        self.bump_generation();
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let type_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type ORDER BY node_type")
                .fetch_all(self.db.pool())
                .await
                .map_err(map_store_error)?;

        let (edge_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges")
            .fetch_one(self.db.pool())
            .await
            .map_err(map_store_error)?;

        let nodes_by_type: BTreeMap<String, i64> = type_rows.into_iter().collect();
        let node_count = nodes_by_type.values().sum();

        Ok(GraphStats {
            nodes_by_type,
            node_count,
            edge_count,
        })
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
