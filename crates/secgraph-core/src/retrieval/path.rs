//! Shortest-path search between two nodes
//!
//! Breadth-first over the undirected view of the graph, bounded by a
//! hop cap. Backs learning paths: the chain of topics connecting a
//! starting point to a goal.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::graph::{Direction, GraphStore, Node, Relation, with_retry};

/// Hard cap on path length, in hops
pub const MAX_PATH_HOPS: u32 = 6;

/// An ordered chain of nodes and the relations connecting them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPath {
    /// Nodes along the path, start first
    pub nodes: Vec<Node>,
    /// Relations between consecutive nodes; always one fewer than nodes
    pub relations: Vec<Relation>,
}

impl LearningPath {
    /// Number of hops in the path
    pub fn hops(&self) -> usize {
        self.relations.len()
    }
}

/// Find a shortest path between two nodes, if one exists within the cap
///
/// Edges are followed in both directions. Ties are broken by the store's
/// deterministic neighbor ordering, so identical input against the same
/// graph yields an identical path. No path is `Ok(None)`, not an error.
pub async fn find_path(
    store: &dyn GraphStore,
    start: &Node,
    target: &str,
) -> Result<Option<LearningPath>> {
    if start.id == target {
        return Ok(Some(LearningPath {
            nodes: vec![start.clone()],
            relations: Vec::new(),
        }));
    }

    // First arrival wins: id -> (parent id, relation taken, node)
    let mut parents: HashMap<String, (String, Relation, Node)> = HashMap::new();
    let mut frontier = vec![start.id.clone()];

    for hop in 1..=MAX_PATH_HOPS {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();

        for from_id in frontier {
            let neighbors = with_retry(|| store.neighbors(&from_id, None, Direction::Both)).await?;
            for (edge, neighbor) in neighbors {
                if neighbor.id == start.id || parents.contains_key(&neighbor.id) {
                    continue;
                }
                let found = neighbor.id == target;
                parents.insert(
                    neighbor.id.clone(),
                    (from_id.clone(), edge.relation.clone(), neighbor.clone()),
                );
                if found {
                    debug!(start = %start.id, target = %target, hops = hop, "Path found");
                    return Ok(Some(reconstruct(start, target, &parents)));
                }
                next_frontier.push(neighbor.id);
            }
        }

        frontier = next_frontier;
    }

    debug!(start = %start.id, target = %target, max_hops = MAX_PATH_HOPS, "No path within hop cap");
    Ok(None)
}

/// Walk the parent links back from the target and reverse into a path
fn reconstruct(
    start: &Node,
    target: &str,
    parents: &HashMap<String, (String, Relation, Node)>,
) -> LearningPath {
    let mut nodes = Vec::new();
    let mut relations = Vec::new();
    let mut cursor = target.to_string();

    while cursor != start.id {
        let (parent, relation, node) = &parents[&cursor];
        nodes.push(node.clone());
        relations.push(relation.clone());
        cursor = parent.clone();
    }
    nodes.push(start.clone());
    nodes.reverse();
    relations.reverse();

    LearningPath { nodes, relations }
}
