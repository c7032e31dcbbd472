//! Context bundle types
//!
//! A [`ContextBundle`] is the immutable result of one retrieval: the seed
//! ids, the retained nodes annotated with hop distance and relevance, the
//! edges among retained nodes, and a truncation flag. Bundles are serde
//! round-trippable and persisted verbatim inside conversation turns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::{Edge, Node, Relation};

/// A retained node with its retrieval annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    /// The node itself
    pub node: Node,
    /// Shortest-path distance from the nearest seed (seeds are 0)
    pub hop_distance: u32,
    /// Ranking score; higher is more relevant
    pub relevance: f64,
    /// Relations along the path from the seed that first reached this node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Relation>,
}

/// The assembled grounding context for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Seed node ids, in resolution order
    pub seeds: Vec<String>,
    /// Retained nodes, in ranked order
    pub nodes: Vec<ScoredNode>,
    /// Edges whose endpoints were both retained
    pub edges: Vec<Edge>,
    /// Whether expansion or trimming hit a cap
    pub truncated: bool,
}

impl ContextBundle {
    /// An empty bundle (valid no-match outcome)
    pub fn empty() -> Self {
        Self {
            seeds: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            truncated: false,
        }
    }

    /// Whether the bundle carries any nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the given id is one of the seeds
    pub fn is_seed(&self, id: &str) -> bool {
        self.seeds.iter().any(|s| s == id)
    }

    /// Ids of all retained nodes
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|s| s.node.id.as_str()).collect()
    }

    /// Every edge endpoint refers to a retained node
    pub fn has_no_dangling_edges(&self) -> bool {
        let ids = self.node_ids();
        self.edges
            .iter()
            .all(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
    }
}
