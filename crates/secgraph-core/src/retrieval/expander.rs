//! Bounded breadth-first neighborhood expansion
//!
//! Walks out from the seeds layer by layer. Neighbor queries within one
//! layer run concurrently, but layers are processed strictly in order so
//! the recorded hop distance of every node is its true shortest-path
//! distance from the nearest seed.

use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::graph::{Direction, Edge, GraphStore, Node, NodeType, Relation, with_retry};

/// Hard cap on expansion depth
pub const MAX_DEPTH: u32 = 3;

/// Default expansion depth
pub const DEFAULT_DEPTH: u32 = 1;

/// Default cap on admitted nodes
pub const DEFAULT_MAX_NODES: usize = 500;

/// Options controlling one expansion
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// How many hops to walk (clamped to [`MAX_DEPTH`])
    pub depth: u32,
    /// Stop admitting new nodes once this many are reached
    pub max_nodes: usize,
    /// Only follow edges with these relations, if set
    pub relations: Option<Vec<Relation>>,
    /// Only admit nodes with these types, if set (seeds are exempt)
    pub node_types: Option<Vec<NodeType>>,
    /// Traversal direction
    pub direction: Direction,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            relations: None,
            node_types: None,
            direction: Direction::Both,
        }
    }
}

impl ExpandOptions {
    /// Set the depth
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the node cap
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Restrict traversal to the given relations
    pub fn with_relations(mut self, relations: Vec<Relation>) -> Self {
        self.relations = Some(relations);
        self
    }

    /// Restrict admitted nodes to the given types (seeds are exempt)
    pub fn with_node_types(mut self, node_types: Vec<NodeType>) -> Self {
        self.node_types = Some(node_types);
        self
    }
}

/// A node reached by expansion, with traversal annotations
#[derive(Debug, Clone)]
pub struct ExpandedNode {
    /// The node
    pub node: Node,
    /// First-arrival hop distance from the nearest seed
    pub hop_distance: u32,
    /// Relations along the path that first reached this node
    pub path: Vec<Relation>,
}

/// Result of one expansion
#[derive(Debug, Clone)]
pub struct Expansion {
    /// All admitted nodes (seeds first, then by layer)
    pub nodes: Vec<ExpandedNode>,
    /// Edges among admitted nodes, deduplicated
    pub edges: Vec<Edge>,
    /// Whether the node cap stopped admission
    pub truncated: bool,
}

/// Expand the neighborhood of the given seeds
pub async fn expand(
    store: &dyn GraphStore,
    seeds: &[Node],
    opts: &ExpandOptions,
) -> Result<Expansion> {
    let depth = opts.depth.min(MAX_DEPTH);

    let mut admitted: HashMap<String, usize> = HashMap::new();
    let mut nodes: Vec<ExpandedNode> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut edge_keys: HashSet<(String, String, String)> = HashSet::new();
    let mut truncated = false;

    for seed in seeds {
        if admitted.contains_key(&seed.id) {
            continue;
        }
        if nodes.len() >= opts.max_nodes {
            truncated = true;
            break;
        }
        admitted.insert(seed.id.clone(), nodes.len());
        nodes.push(ExpandedNode {
            node: seed.clone(),
            hop_distance: 0,
            path: Vec::new(),
        });
    }

    let mut frontier: Vec<String> = nodes.iter().map(|n| n.node.id.clone()).collect();

    for layer in 1..=depth {
        if frontier.is_empty() {
            break;
        }

        // Fan out the whole layer concurrently; layer order preserves
        // exact first-arrival distances
        let relations = opts.relations.as_deref();
        let queries = frontier.iter().map(|id| {
            let id = id.clone();
            async move {
                let result =
                    with_retry(|| store.neighbors(&id, relations, opts.direction)).await;
                (id, result)
            }
        });
        let results = join_all(queries).await;

        let mut next_frontier: Vec<String> = Vec::new();

        for (from_id, result) in results {
            let from_path = admitted
                .get(&from_id)
                .map(|&idx| nodes[idx].path.clone())
                .unwrap_or_default();

            for (edge, neighbor) in result? {
                if let Some(wanted) = &opts.node_types {
                    if !admitted.contains_key(&neighbor.id) && !wanted.contains(&neighbor.node_type)
                    {
                        continue;
                    }
                }

                let neighbor_admitted = if admitted.contains_key(&neighbor.id) {
                    true
                } else if nodes.len() < opts.max_nodes {
                    let mut path = from_path.clone();
                    path.push(edge.relation.clone());
                    admitted.insert(neighbor.id.clone(), nodes.len());
                    nodes.push(ExpandedNode {
                        node: neighbor.clone(),
                        hop_distance: layer,
                        path,
                    });
                    next_frontier.push(neighbor.id.clone());
                    true
                } else {
                    // Cap reached: no new nodes, but edges among admitted
                    // nodes are still collected
                    truncated = true;
                    false
                };

                if neighbor_admitted
                    && admitted.contains_key(&edge.source)
                    && admitted.contains_key(&edge.target)
                    && edge_keys.insert(edge.key())
                {
                    edges.push(edge);
                }
            }
        }

        frontier = next_frontier;
    }

    debug!(
        seeds = seeds.len(),
        nodes = nodes.len(),
        edges = edges.len(),
        depth = depth,
        truncated = truncated,
        "Neighborhood expansion complete"
    );

    Ok(Expansion {
        nodes,
        edges,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::storage::Database;

    /// Chain fixture: s -> a -> b -> c, plus a shortcut s -> b
    async fn chain_store() -> SqliteGraphStore {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        for id in ["s", "a", "b", "c"] {
            store
                .save_node(&Node::new(id, NodeType::Technique, id.to_uppercase()))
                .await
                .unwrap();
        }
        for (src, dst) in [("s", "a"), ("a", "b"), ("b", "c"), ("s", "b")] {
            store
                .save_edge(&Edge::new(src, dst, Relation::RelatesTo))
                .await
                .unwrap();
        }
        store
    }

    async fn seed(store: &SqliteGraphStore, id: &str) -> Node {
        store.find_by_id(id).await.unwrap().unwrap()
    }

    fn hop_of(expansion: &Expansion, id: &str) -> u32 {
        expansion
            .nodes
            .iter()
            .find(|n| n.node.id == id)
            .map(|n| n.hop_distance)
            .expect("node not admitted")
    }

    #[tokio::test]
    async fn test_hop_distance_is_shortest_path() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];

        let opts = ExpandOptions::default().with_depth(3);
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        assert_eq!(hop_of(&expansion, "s"), 0);
        assert_eq!(hop_of(&expansion, "a"), 1);
        // b is reachable via the shortcut, not only through a
        assert_eq!(hop_of(&expansion, "b"), 1);
        assert_eq!(hop_of(&expansion, "c"), 2);
    }

    #[tokio::test]
    async fn test_depth_limits_expansion() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];

        let opts = ExpandOptions {
            direction: Direction::Outgoing,
            ..ExpandOptions::default()
        }
        .with_depth(1);
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        let ids: Vec<&str> = expansion.nodes.iter().map(|n| n.node.id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(!ids.contains(&"c"));
    }

    #[tokio::test]
    async fn test_depth_clamped_to_hard_cap() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];

        // Requesting depth 10 behaves like depth 3
        let opts = ExpandOptions::default().with_depth(10);
        let expansion = expand(&store, &seeds, &opts).await.unwrap();
        assert_eq!(expansion.nodes.len(), 4);
    }

    #[tokio::test]
    async fn test_expansion_is_idempotent() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];
        let opts = ExpandOptions::default().with_depth(2);

        let first = expand(&store, &seeds, &opts).await.unwrap();
        let second = expand(&store, &seeds, &opts).await.unwrap();

        let ids = |e: &Expansion| -> Vec<(String, u32)> {
            e.nodes
                .iter()
                .map(|n| (n.node.id.clone(), n.hop_distance))
                .collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.edges.len(), second.edges.len());
        assert_eq!(first.truncated, second.truncated);
    }

    #[tokio::test]
    async fn test_node_cap_sets_truncated_but_keeps_edges() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];

        let opts = ExpandOptions::default().with_depth(3).with_max_nodes(2);
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        assert!(expansion.truncated);
        assert_eq!(expansion.nodes.len(), 2);
        // Every collected edge connects two admitted nodes
        let ids: HashSet<&str> = expansion.nodes.iter().map(|n| n.node.id.as_str()).collect();
        for edge in &expansion.edges {
            assert!(ids.contains(edge.source.as_str()));
            assert!(ids.contains(edge.target.as_str()));
        }
    }

    #[tokio::test]
    async fn test_self_loop_kept_as_edge_not_node() {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        store
            .save_node(&Node::new("a", NodeType::Technique, "A"))
            .await
            .unwrap();
        store
            .save_edge(&Edge::new("a", "a", Relation::RelatesTo))
            .await
            .unwrap();

        let seeds = vec![seed(&store, "a").await];
        let expansion = expand(&store, &seeds, &ExpandOptions::default())
            .await
            .unwrap();

        assert_eq!(expansion.nodes.len(), 1);
        assert_eq!(expansion.edges.len(), 1);
        assert!(expansion.edges[0].is_self_loop());
    }

    #[tokio::test]
    async fn test_relation_filter() {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        for id in ["a", "b", "c"] {
            store
                .save_node(&Node::new(id, NodeType::Technique, id.to_uppercase()))
                .await
                .unwrap();
        }
        store.save_edge(&Edge::new("a", "b", Relation::Mitigates)).await.unwrap();
        store.save_edge(&Edge::new("a", "c", Relation::Uses)).await.unwrap();

        let seeds = vec![seed(&store, "a").await];
        let opts = ExpandOptions {
            relations: Some(vec![Relation::Mitigates]),
            ..ExpandOptions::default()
        };
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        let ids: Vec<&str> = expansion.nodes.iter().map(|n| n.node.id.as_str()).collect();
        assert!(ids.contains(&"b"));
        assert!(!ids.contains(&"c"));
    }

    #[tokio::test]
    async fn test_node_type_filter_exempts_seeds() {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        store.save_node(&Node::new("t", NodeType::Technique, "T")).await.unwrap();
        store.save_node(&Node::new("d", NodeType::Defense, "D")).await.unwrap();
        store.save_node(&Node::new("l", NodeType::Lab, "L")).await.unwrap();
        store.save_edge(&Edge::new("d", "t", Relation::Mitigates)).await.unwrap();
        store.save_edge(&Edge::new("t", "l", Relation::PracticesIn)).await.unwrap();

        let seeds = vec![seed(&store, "t").await];
        let opts = ExpandOptions {
            node_types: Some(vec![NodeType::Defense]),
            ..ExpandOptions::default()
        };
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        let ids: Vec<&str> = expansion.nodes.iter().map(|n| n.node.id.as_str()).collect();
        assert!(ids.contains(&"t"), "seed kept despite type filter");
        assert!(ids.contains(&"d"));
        assert!(!ids.contains(&"l"));
    }

    #[tokio::test]
    async fn test_path_annotation() {
        let store = chain_store().await;
        let seeds = vec![seed(&store, "s").await];

        let opts = ExpandOptions {
            direction: Direction::Outgoing,
            ..ExpandOptions::default()
        }
        .with_depth(3);
        let expansion = expand(&store, &seeds, &opts).await.unwrap();

        let c = expansion.nodes.iter().find(|n| n.node.id == "c").unwrap();
        assert_eq!(c.hop_distance, 2);
        assert_eq!(c.path.len(), 2);
        assert!(c.path.iter().all(|r| *r == Relation::RelatesTo));
    }
}
