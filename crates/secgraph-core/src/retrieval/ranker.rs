//! Context ranking and trimming
//!
//! Scores every expanded node and trims the set to the configured budget.
//! Seeds are always retained; after trimming, edges with a missing
//! endpoint are dropped so the bundle stays internally consistent.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::Node;
use crate::retrieval::bundle::{ContextBundle, ScoredNode};
use crate::retrieval::expander::Expansion;

/// Weights and budget for ranking
///
/// The defaults are tuned for interactive Q&A and are configurable, not
/// load-bearing: any setting must still produce a deterministic bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Score bonus for seed nodes
    pub seed_weight: f64,
    /// Numerator of the hop-decay term `hop_decay / (1 + hop)`
    pub hop_decay: f64,
    /// Multiplier for normalized severity
    pub severity_weight: f64,
    /// Maximum nodes retained in a bundle
    pub max_nodes: usize,
    /// Optional character budget over labels and descriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<usize>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            seed_weight: 1.0,
            hop_decay: 1.0,
            severity_weight: 0.5,
            max_nodes: 50,
            max_chars: None,
        }
    }
}

/// Relevance of one node: seed bonus + hop decay + weighted severity
fn relevance(node: &Node, hop: u32, is_seed: bool, cfg: &RankingConfig) -> f64 {
    let seed_term = if is_seed { cfg.seed_weight } else { 0.0 };
    let hop_term = cfg.hop_decay / (1.0 + hop as f64);
    let severity_term = cfg.severity_weight * normalized_severity(node);
    seed_term + hop_term + severity_term
}

/// Normalize severity to 0..=1
///
/// A numeric CVSS score maps 0-10 to 0-1; otherwise a severity word is
/// used. Absence or unknown values contribute zero, never an error.
pub fn normalized_severity(node: &Node) -> f64 {
    if let Some(cvss) = node.cvss() {
        return (cvss / 10.0).clamp(0.0, 1.0);
    }
    match node.severity().map(str::to_ascii_lowercase).as_deref() {
        Some("critical") => 1.0,
        Some("high") => 0.75,
        Some("medium") => 0.5,
        Some("low") => 0.25,
        _ => 0.0,
    }
}

/// Approximate character cost of including a node in the context
fn char_cost(node: &Node) -> usize {
    node.label.len() + node.description().map_or(0, str::len)
}

/// Rank an expansion and trim it into a [`ContextBundle`]
///
/// Nodes are sorted by relevance descending with id ascending as the
/// tie-break, so the result is fully deterministic. Seeds survive
/// trimming regardless of budget.
pub fn rank(seeds: &[String], expansion: Expansion, cfg: &RankingConfig) -> ContextBundle {
    let seed_set: HashSet<&str> = seeds.iter().map(String::as_str).collect();

    let mut scored: Vec<ScoredNode> = expansion
        .nodes
        .into_iter()
        .map(|expanded| {
            let is_seed = seed_set.contains(expanded.node.id.as_str());
            let relevance = relevance(&expanded.node, expanded.hop_distance, is_seed, cfg);
            ScoredNode {
                node: expanded.node,
                hop_distance: expanded.hop_distance,
                relevance,
                path: expanded.path,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });

    let mut truncated = expansion.truncated;
    let mut kept: Vec<ScoredNode> = Vec::new();
    let mut budget_nodes = cfg.max_nodes;
    let mut budget_chars = cfg.max_chars;

    for node in scored {
        let is_seed = seed_set.contains(node.node.id.as_str());
        let cost = char_cost(&node.node);

        let fits = budget_nodes > 0
            && budget_chars.map_or(true, |remaining| cost <= remaining);

        if is_seed || fits {
            budget_nodes = budget_nodes.saturating_sub(1);
            if let Some(remaining) = budget_chars {
                budget_chars = Some(remaining.saturating_sub(cost));
            }
            kept.push(node);
        } else {
            truncated = true;
        }
    }

    let kept_ids: HashSet<&str> = kept.iter().map(|s| s.node.id.as_str()).collect();
    let edges = expansion
        .edges
        .into_iter()
        .filter(|e| kept_ids.contains(e.source.as_str()) && kept_ids.contains(e.target.as_str()))
        .collect();

    ContextBundle {
        seeds: seeds.to_vec(),
        nodes: kept,
        edges,
        truncated,
    }
}
