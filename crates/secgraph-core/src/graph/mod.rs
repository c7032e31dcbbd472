//! Typed knowledge graph model and store adapters
//!
//! The graph holds security knowledge as typed nodes (CVEs, techniques,
//! defenses, tools, labs) connected by directed, typed edges. Access goes
//! through the [`GraphStore`] trait; [`SqliteGraphStore`] is the provided
//! backend.

pub mod edge;
pub mod node;
pub mod sqlite;
pub mod store;

pub use edge::{Edge, Relation};
pub use node::{Node, NodeType};
pub use sqlite::SqliteGraphStore;
pub use store::{Direction, GraphStats, GraphStore, with_retry};
