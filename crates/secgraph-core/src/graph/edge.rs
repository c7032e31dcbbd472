//! Graph edge types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Relation carried by a directed edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    /// A CVE exploits a technique's weakness
    Exploits,
    /// A defense mitigates a technique or CVE
    Mitigates,
    /// Generic association
    RelatesTo,
    /// A technique is practiced in a lab
    PracticesIn,
    /// A technique or lab uses a tool
    Uses,
    /// Any other relation, preserved verbatim
    Other(String),
}

impl Relation {
    /// Get the string representation (snake_case)
    pub fn as_str(&self) -> &str {
        match self {
            Relation::Exploits => "exploits",
            Relation::Mitigates => "mitigates",
            Relation::RelatesTo => "relates_to",
            Relation::PracticesIn => "practices_in",
            Relation::Uses => "uses",
            Relation::Other(s) => s,
        }
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "exploits" => Relation::Exploits,
            "mitigates" => Relation::Mitigates,
            "relates_to" => Relation::RelatesTo,
            "practices_in" => Relation::PracticesIn,
            "uses" => Relation::Uses,
            _ => Relation::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Relation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Relation::parse(&s))
    }
}

/// A directed edge between two nodes
///
/// The graph is a multigraph: the same node pair may be connected by
/// several edges as long as their relations differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relation type
    pub relation: Relation,
    /// Optional edge properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl Edge {
    /// Create a new edge
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: Relation) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            properties: None,
        }
    }

    /// Whether this edge starts and ends on the same node
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Deduplication key: source, target and relation identify an edge
    pub fn key(&self) -> (String, String, String) {
        (
            self.source.clone(),
            self.target.clone(),
            self.relation.as_str().to_string(),
        )
    }
}
