//! Retrieval pipeline: resolve, expand, rank
//!
//! Turns a query (an explicit node id or free text) into a ranked,
//! budget-trimmed [`ContextBundle`]:
//!
//! 1. the resolver maps the query to seed nodes,
//! 2. the expander walks the neighborhood breadth-first to a bounded depth,
//! 3. the ranker scores every reached node and trims to the budget.

pub mod bundle;
pub mod cache;
pub mod expander;
pub mod path;
pub mod ranker;
pub mod resolver;

pub use bundle::{ContextBundle, ScoredNode};
pub use cache::RetrievalCache;
pub use expander::{ExpandOptions, Expansion, MAX_DEPTH, expand};
pub use path::{LearningPath, MAX_PATH_HOPS, find_path};
pub use ranker::{RankingConfig, normalized_severity, rank};
pub use resolver::{detect_topic, extract_keywords, resolve_id, resolve_text};
