//! Graph node types
//!
//! Nodes carry a stable id, a type, a display label and an open JSON
//! property bag. Well-known properties (description, severity, cvss, url,
//! category, tags) get typed accessors that tolerate absence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type of a knowledge graph node
///
/// The `Other` variant round-trips node types this crate does not know
/// about, so graphs written by newer ingestion tools stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// A CVE entry
    Cve,
    /// An attack technique (e.g. SQL injection)
    Technique,
    /// A defensive measure or mitigation
    Defense,
    /// A security tool
    Tool,
    /// A practice lab or training range
    Lab,
    /// Any other node type, preserved verbatim
    Other(String),
}

impl NodeType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Cve => "cve",
            NodeType::Technique => "technique",
            NodeType::Defense => "defense",
            NodeType::Tool => "tool",
            NodeType::Lab => "lab",
            NodeType::Other(s) => s,
        }
    }

    /// Parse from a string (case-insensitive for the known types)
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cve" => NodeType::Cve,
            "technique" => NodeType::Technique,
            "defense" => NodeType::Defense,
            "tool" => NodeType::Tool,
            "lab" => NodeType::Lab,
            _ => NodeType::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for NodeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeType::parse(&s))
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique identifier
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Human-readable label
    pub label: String,
    /// Open property bag (description, severity, cvss, url, category, tags, ...)
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Node {
    /// Create a new node
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            properties: Map::new(),
        }
    }

    /// Set a property (builder style)
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a string property, if present and a string
    fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Description text, if any
    pub fn description(&self) -> Option<&str> {
        self.str_property("description")
    }

    /// Severity word (critical/high/medium/low), if any
    pub fn severity(&self) -> Option<&str> {
        self.str_property("severity")
    }

    /// CVSS base score, if present and numeric
    pub fn cvss(&self) -> Option<f64> {
        self.properties.get("cvss").and_then(Value::as_f64)
    }

    /// Reference URL, if any
    pub fn url(&self) -> Option<&str> {
        self.str_property("url")
    }

    /// Category, if any
    pub fn category(&self) -> Option<&str> {
        self.str_property("category")
    }

    /// Tags; empty if absent or not an array
    pub fn tags(&self) -> Vec<&str> {
        self.properties
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}
