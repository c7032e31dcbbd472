//! Entity resolution
//!
//! Maps an explicit id or free text to seed nodes. Id lookups that miss
//! are an error (the caller named something that should exist); free-text
//! resolution that matches nothing is a valid empty result.

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{GraphStore, Node, with_retry};

/// Default maximum number of seeds returned by free-text resolution
pub const DEFAULT_MAX_SEEDS: usize = 10;

/// Security terms recognized during keyword extraction, most specific
/// first. Mixed Chinese/English, matching the vocabulary of the ingested
/// knowledge base.
const SECURITY_TERMS: &[&str] = &[
    "SQL注入",
    "XSS",
    "CSRF",
    "RCE",
    "SSRF",
    "XXE",
    "缓冲区溢出",
    "权限提升",
    "命令注入",
    "文件包含",
    "文件上传",
    "反序列化",
    "越权",
    "逻辑漏洞",
    "加密",
    "认证",
    "CVE",
    "漏洞",
    "攻击",
    "防御",
    "渗透测试",
    "SQL Injection",
    "Cross-Site Scripting",
    "Remote Code Execution",
];

/// Resolve an explicit node id to its node
///
/// A missing id is `EntityNotFound`: unlike free-text search, the caller
/// named a node that should exist.
pub async fn resolve_id(store: &dyn GraphStore, id: &str) -> Result<Node> {
    with_retry(|| store.find_by_id(id))
        .await?
        .ok_or_else(|| Error::EntityNotFound(id.to_string()))
}

/// Resolve free text to up to `max_seeds` seed nodes
///
/// Candidates come from label search; they are ordered by exact-label
/// match first, then by how many query tokens they match, then by id so
/// the result is deterministic for identical input and graph state. An
/// empty result is a valid no-match outcome, not an error.
pub async fn resolve_text(
    store: &dyn GraphStore,
    text: &str,
    max_seeds: usize,
) -> Result<Vec<Node>> {
    let keywords = extract_keywords(text);
    debug!(query = %text, keywords = ?keywords, "Resolving free-text query");

    let mut candidates: Vec<Node> = Vec::new();
    for keyword in &keywords {
        let results = with_retry(|| store.find_by_label(keyword, None)).await?;
        for node in results {
            if !candidates.iter().any(|c| c.id == node.id) {
                candidates.push(node);
            }
        }
    }

    let text_lower = text.to_lowercase();
    let tokens: Vec<String> = text_lower
        .split_whitespace()
        .map(str::to_string)
        .collect();

    candidates.sort_by(|a, b| {
        let a_exact = is_exact_match(a, &text_lower, &keywords);
        let b_exact = is_exact_match(b, &text_lower, &keywords);
        b_exact
            .cmp(&a_exact)
            .then_with(|| matched_tokens(b, &tokens).cmp(&matched_tokens(a, &tokens)))
            .then_with(|| a.id.cmp(&b.id))
    });

    candidates.truncate(max_seeds);
    Ok(candidates)
}

/// Whether the node's label equals the query or one of its keywords
fn is_exact_match(node: &Node, text_lower: &str, keywords: &[String]) -> bool {
    let label_lower = node.label.to_lowercase();
    label_lower == text_lower
        || keywords.iter().any(|k| k.to_lowercase() == label_lower)
}

/// Count query tokens that appear in the node's label, tags, or category
///
/// Label search also matches on tags and category, so the tie-break has
/// to look at the same fields or a tag-matched candidate would always
/// score zero.
fn matched_tokens(node: &Node, tokens: &[String]) -> usize {
    let mut haystack = node.label.to_lowercase();
    for tag in node.tags() {
        haystack.push(' ');
        haystack.push_str(&tag.to_lowercase());
    }
    if let Some(category) = node.category() {
        haystack.push(' ');
        haystack.push_str(&category.to_lowercase());
    }
    tokens.iter().filter(|t| haystack.contains(t.as_str())).count()
}

/// Extract search keywords from a question
///
/// Known security terms win; if none match, fall back to whitespace
/// tokens longer than two characters (at most three of them), and as a
/// last resort a prefix of the raw text.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let text_lower = text.to_lowercase();

    let mut keywords: Vec<String> = SECURITY_TERMS
        .iter()
        .filter(|term| text_lower.contains(&term.to_lowercase()))
        .map(|term| term.to_string())
        .collect();

    if keywords.is_empty() {
        keywords = text
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .take(3)
            .map(str::to_string)
            .collect();
    }

    if keywords.is_empty() {
        let prefix: String = text.chars().take(20).collect();
        if !prefix.is_empty() {
            keywords.push(prefix);
        }
    }

    keywords
}

/// Detect the primary security topic mentioned in a text, if any
pub fn detect_topic(text: &str) -> Option<&'static str> {
    let text_lower = text.to_lowercase();
    SECURITY_TERMS
        .iter()
        .find(|term| text_lower.contains(&term.to_lowercase()))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeType, SqliteGraphStore};
    use crate::storage::Database;

    async fn seeded_store() -> SqliteGraphStore {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        let nodes = [
            Node::new("sqli", NodeType::Technique, "SQL注入")
                .with_property("description", "SQL Injection"),
            Node::new("xss", NodeType::Technique, "XSS")
                .with_property("description", "Cross-Site Scripting"),
            Node::new("sqlmap", NodeType::Tool, "sqlmap")
                .with_property("description", "Automated SQL injection tool"),
        ];
        for node in &nodes {
            store.save_node(node).await.unwrap();
        }
        store
    }

    #[test]
    fn test_extract_keywords_prefers_security_terms() {
        let keywords = extract_keywords("什么是SQL注入攻击？");
        assert!(keywords.contains(&"SQL注入".to_string()));
        assert!(keywords.contains(&"攻击".to_string()));
    }

    #[test]
    fn test_extract_keywords_matches_english_terms() {
        let keywords = extract_keywords("How do I prevent sql injection?");
        assert!(keywords.contains(&"SQL Injection".to_string()));
    }

    #[test]
    fn test_extract_keywords_fallback_tokenization() {
        let keywords = extract_keywords("configure nginx reverse proxy caching rules");
        assert_eq!(keywords.len(), 3);
        assert_eq!(keywords[0], "configure");
    }

    #[test]
    fn test_extract_keywords_short_text_uses_prefix() {
        let keywords = extract_keywords("ab cd");
        assert_eq!(keywords, vec!["ab cd".to_string()]);
    }

    #[test]
    fn test_detect_topic() {
        assert_eq!(detect_topic("tell me about XSS please"), Some("XSS"));
        assert_eq!(detect_topic("nothing security related"), None);
    }

    #[tokio::test]
    async fn test_resolve_id_found_and_missing() {
        let store = seeded_store().await;

        let node = resolve_id(&store, "sqli").await.unwrap();
        assert_eq!(node.label, "SQL注入");

        let err = resolve_id(&store, "nope").await.unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_text_exact_label_wins() {
        let store = seeded_store().await;

        let seeds = resolve_text(&store, "XSS", DEFAULT_MAX_SEEDS).await.unwrap();
        assert!(!seeds.is_empty());
        assert_eq!(seeds[0].id, "xss");
    }

    #[tokio::test]
    async fn test_resolve_text_no_match_is_empty_not_error() {
        let store = seeded_store().await;

        let seeds = resolve_text(&store, "quantum gardening", DEFAULT_MAX_SEEDS)
            .await
            .unwrap();
        assert!(seeds.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_text_is_deterministic() {
        let store = seeded_store().await;

        let a = resolve_text(&store, "什么是SQL注入？", DEFAULT_MAX_SEEDS).await.unwrap();
        let b = resolve_text(&store, "什么是SQL注入？", DEFAULT_MAX_SEEDS).await.unwrap();
        let ids_a: Vec<&str> = a.iter().map(|n| n.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[tokio::test]
    async fn test_resolve_text_tag_match_counts_in_ordering() {
        let store = SqliteGraphStore::new(Database::in_memory().await.unwrap());
        // zz-tagged matches a query token only through its tag; without
        // tag-aware scoring the id tie-break would put aa-plain first.
        store
            .save_node(
                &Node::new("aa-plain", NodeType::Technique, "Generic weakness")
                    .with_property("description", "covers clickjacking basics"),
            )
            .await
            .unwrap();
        store
            .save_node(
                &Node::new("zz-tagged", NodeType::Technique, "Frame busting bypass")
                    .with_property("tags", serde_json::json!(["clickjacking"])),
            )
            .await
            .unwrap();

        let seeds = resolve_text(&store, "clickjacking examples please", DEFAULT_MAX_SEEDS)
            .await
            .unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].id, "zz-tagged");
    }

    #[tokio::test]
    async fn test_resolve_text_respects_max_seeds() {
        let store = seeded_store().await;

        let seeds = resolve_text(&store, "sql", 1).await.unwrap();
        assert_eq!(seeds.len(), 1);
    }
}
