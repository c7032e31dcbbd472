//! Service facade
//!
//! [`KnowledgeService`] wires the graph store, the retrieval pipeline,
//! the conversation manager and the answer composer behind one typed
//! surface. This is the API the CLI (and any other frontend) consumes.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::chat::{Answer, Conversation, ConversationManager, Turn, title_from_question};
use crate::compose::{AnswerComposer, AnswerMode, ComposerConfig, FAILURE_NOTICE};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{Edge, GraphStats, GraphStore, Node, NodeType, Relation, with_retry};
use crate::llm::CompletionClient;
use crate::retrieval::{
    ContextBundle, ExpandOptions, LearningPath, RetrievalCache, detect_topic, expand, find_path,
    normalized_severity, rank, resolve_text,
};
use crate::storage::Database;

/// The engine's service facade
pub struct KnowledgeService {
    store: Arc<dyn GraphStore>,
    chat: Arc<ConversationManager>,
    composer: AnswerComposer,
    config: Config,
    cache: Option<RetrievalCache>,
}

impl KnowledgeService {
    /// Wire a service from its parts
    pub fn new(
        store: Arc<dyn GraphStore>,
        db: Database,
        client: Arc<dyn CompletionClient>,
        config: Config,
    ) -> Self {
        let composer = AnswerComposer::with_config(
            client,
            ComposerConfig {
                timeout: Duration::from_secs(config.llm.timeout_secs),
                ..ComposerConfig::default()
            },
        );

        let cache = (config.retrieval.cache_ttl_secs > 0)
            .then(|| RetrievalCache::new(Duration::from_secs(config.retrieval.cache_ttl_secs)));

        Self {
            store,
            chat: Arc::new(ConversationManager::new(db)),
            composer,
            config,
            cache,
        }
    }

    /// Replace the composer (custom timeout or history window)
    pub fn with_composer(mut self, composer: AnswerComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Search nodes by text, optionally restricted to one type
    pub async fn search(
        &self,
        query: &str,
        node_type: Option<&NodeType>,
        limit: usize,
    ) -> Result<Vec<Node>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("search query must not be empty".into()));
        }

        let mut results = with_retry(|| self.store.find_by_label(query, node_type)).await?;
        results.truncate(limit);
        Ok(results)
    }

    /// The ranked neighborhood of one node, looked up by id or label
    pub async fn related_knowledge(
        &self,
        id_or_label: &str,
        depth: Option<u32>,
    ) -> Result<ContextBundle> {
        self.related_knowledge_filtered(id_or_label, depth, None, None)
            .await
    }

    /// Like [`related_knowledge`], restricted to some relations or node types
    ///
    /// Filters narrow traversal, so `mitigates`/`defense` answers "what
    /// defends against this?" and `practices_in`/`lab` answers "where can
    /// I practice this?".
    ///
    /// [`related_knowledge`]: Self::related_knowledge
    pub async fn related_knowledge_filtered(
        &self,
        id_or_label: &str,
        depth: Option<u32>,
        relations: Option<Vec<Relation>>,
        node_types: Option<Vec<NodeType>>,
    ) -> Result<ContextBundle> {
        let seed = self.resolve_entity(id_or_label).await?;

        let mut opts = self.expand_options(depth);
        opts.relations = relations;
        opts.node_types = node_types;

        self.retrieve(vec![seed], opts).await
    }

    /// Shortest chain of topics from one entity to another
    ///
    /// Both endpoints are looked up by id or label. A missing endpoint is
    /// `EntityNotFound`; two resolved endpoints with no connecting edges
    /// within the hop cap is `Ok(None)`.
    pub async fn learning_path(&self, from: &str, to: &str) -> Result<Option<LearningPath>> {
        let start = self.resolve_entity(from).await?;
        let target = self.resolve_entity(to).await?;
        find_path(self.store.as_ref(), &start, &target.id).await
    }

    /// Techniques ordered by severity, most severe first
    ///
    /// With a severity word the list is filtered to exact matches of that
    /// word (case-insensitive); numeric CVSS scores still drive ordering.
    pub async fn techniques_by_severity(&self, severity: Option<&str>) -> Result<Vec<Node>> {
        let mut techniques = with_retry(|| self.store.find_by_type(&NodeType::Technique)).await?;

        if let Some(word) = severity {
            techniques.retain(|n| {
                n.severity()
                    .is_some_and(|s| s.eq_ignore_ascii_case(word))
            });
        }

        techniques.sort_by(|a, b| {
            normalized_severity(b)
                .partial_cmp(&normalized_severity(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(techniques)
    }

    /// Ask a question, optionally inside an existing conversation
    ///
    /// Without a conversation id a new conversation is created, titled
    /// from the question. The turn is composed and persisted under the
    /// conversation's gate; if generation fails after retry, the question
    /// is still persisted with a failure notice and `GenerationFailed`
    /// surfaces to the caller.
    pub async fn ask_question(
        &self,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<(Conversation, Turn)> {
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question must not be empty".into()));
        }

        let conversation = match conversation_id {
            Some(id) => self.chat.get(id).await?,
            None => self.chat.create(&title_from_question(question)).await?,
        };

        let _gate = self.chat.lock(&conversation.id).await;
        // The conversation may have been deleted while we waited
        let conversation = self.chat.get(&conversation.id).await?;

        let seeds = resolve_text(
            self.store.as_ref(),
            question,
            self.config.retrieval.max_seeds,
        )
        .await?;
        let bundle = self.retrieve(seeds, self.expand_options(None)).await?;

        let history = self
            .chat
            .recent_turns(&conversation.id, self.composer.config().history_turns)
            .await?;
        let mode = self.answer_mode(&conversation.id, question).await?;

        info!(
            conversation_id = %conversation.id,
            seeds = bundle.seeds.len(),
            context_nodes = bundle.nodes.len(),
            mode = ?mode,
            "Composing answer"
        );

        match self
            .composer
            .compose(&bundle, &history, question, mode)
            .await
        {
            Ok(answer) => {
                let turn = self
                    .chat
                    .record_turn(&conversation.id, question, answer, bundle)
                    .await?;
                Ok((conversation, turn))
            }
            Err(Error::GenerationFailed(reason)) => {
                // The question is never lost: persist it with the notice
                warn!(conversation_id = %conversation.id, reason = %reason, "Generation failed, persisting failure notice");
                self.chat
                    .record_turn(
                        &conversation.id,
                        question,
                        Answer::Narrative(FAILURE_NOTICE.to_string()),
                        bundle,
                    )
                    .await?;
                Err(Error::GenerationFailed(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// All conversations, most recently updated first
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.chat.list().await
    }

    /// All turns of one conversation, oldest first
    pub async fn get_conversation_messages(&self, id: &str) -> Result<Vec<Turn>> {
        self.chat.turns(id).await
    }

    /// Delete a conversation and all its turns
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.chat.delete(id).await
    }

    /// Aggregate graph statistics
    pub async fn stats(&self) -> Result<GraphStats> {
        with_retry(|| self.store.stats()).await
    }

    /// Bulk-load already-structured nodes and edges
    ///
    /// This is the write surface the ingestion collaborator uses; nodes
    /// are saved before edges so edge foreign keys resolve.
    pub async fn import_graph(&self, nodes: &[Node], edges: &[Edge]) -> Result<(usize, usize)> {
        for node in nodes {
            with_retry(|| self.store.save_node(node)).await?;
        }
        for edge in edges {
            with_retry(|| self.store.save_edge(edge)).await?;
        }
        info!(nodes = nodes.len(), edges = edges.len(), "Graph import complete");
        Ok((nodes.len(), edges.len()))
    }

    /// Look up one node by id, falling back to label resolution
    async fn resolve_entity(&self, id_or_label: &str) -> Result<Node> {
        match with_retry(|| self.store.find_by_id(id_or_label)).await? {
            Some(node) => Ok(node),
            None => resolve_text(self.store.as_ref(), id_or_label, 1)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::EntityNotFound(id_or_label.to_string())),
        }
    }

    /// Expansion options from configuration, with an optional depth override
    fn expand_options(&self, depth: Option<u32>) -> ExpandOptions {
        ExpandOptions::default()
            .with_depth(depth.unwrap_or(self.config.retrieval.depth))
            .with_max_nodes(self.config.retrieval.max_nodes)
    }

    /// Resolve seeds into a ranked bundle, consulting the cache
    async fn retrieve(&self, seeds: Vec<Node>, opts: ExpandOptions) -> Result<ContextBundle> {
        if seeds.is_empty() {
            return Ok(ContextBundle::empty());
        }

        let seed_ids: Vec<String> = seeds.iter().map(|n| n.id.clone()).collect();
        let key = RetrievalCache::fingerprint(&seed_ids, &opts);
        let generation = self.store.generation();

        if let Some(cache) = &self.cache
            && let Some(bundle) = cache.get(&key, generation)
        {
            return Ok(bundle);
        }

        let expansion = expand(self.store.as_ref(), &seeds, &opts).await?;
        let bundle = rank(&seed_ids, expansion, &self.config.ranking);

        if let Some(cache) = &self.cache {
            cache.put(key, generation, bundle.clone());
        }

        Ok(bundle)
    }

    /// Structured mode for a fresh topic, narrative once it is covered
    async fn answer_mode(&self, conversation_id: &str, question: &str) -> Result<AnswerMode> {
        let Some(topic) = detect_topic(question) else {
            return Ok(AnswerMode::Narrative);
        };

        let turns = self.chat.turns(conversation_id).await?;
        let covered = turns
            .iter()
            .any(|t| t.answer.is_structured() && detect_topic(&t.question) == Some(topic));

        Ok(if covered {
            AnswerMode::Narrative
        } else {
            AnswerMode::Structured
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Relation, SqliteGraphStore};
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, _messages: Vec<crate::llm::Message>) -> Result<String> {
            Ok("a grounded answer".to_string())
        }
    }

    async fn test_service() -> KnowledgeService {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteGraphStore::new(db.clone()));
        KnowledgeService::new(store, db, Arc::new(EchoClient), Config::default())
    }

    async fn seed_graph(service: &KnowledgeService) {
        let nodes = vec![
            Node::new("sqli", NodeType::Technique, "SQL注入")
                .with_property("description", "SQL Injection")
                .with_property("severity", "high"),
            Node::new("waf", NodeType::Defense, "WAF"),
        ];
        let edges = vec![Edge::new("waf", "sqli", Relation::Mitigates)];
        service.import_graph(&nodes, &edges).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let service = test_service().await;
        let err = service.search("  ", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_related_knowledge_by_id_and_label() {
        let service = test_service().await;
        seed_graph(&service).await;

        let by_id = service.related_knowledge("sqli", None).await.unwrap();
        assert!(by_id.node_ids().contains("waf"));

        let by_label = service.related_knowledge("SQL注入", None).await.unwrap();
        assert_eq!(by_label.seeds, by_id.seeds);
    }

    #[tokio::test]
    async fn test_related_knowledge_unknown_entity() {
        let service = test_service().await;
        seed_graph(&service).await;

        let err = service.related_knowledge("ghost", None).await.unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_related_knowledge_filtered_narrows_to_relation_and_type() {
        let service = test_service().await;
        seed_graph(&service).await;
        service
            .import_graph(
                &[Node::new("dvwa", NodeType::Lab, "DVWA")],
                &[Edge::new("sqli", "dvwa", Relation::PracticesIn)],
            )
            .await
            .unwrap();

        let defenses = service
            .related_knowledge_filtered(
                "sqli",
                None,
                Some(vec![Relation::Mitigates]),
                Some(vec![NodeType::Defense]),
            )
            .await
            .unwrap();
        assert!(defenses.node_ids().contains("waf"));
        assert!(!defenses.node_ids().contains("dvwa"));

        let labs = service
            .related_knowledge_filtered(
                "sqli",
                None,
                Some(vec![Relation::PracticesIn]),
                Some(vec![NodeType::Lab]),
            )
            .await
            .unwrap();
        assert!(labs.node_ids().contains("dvwa"));
        assert!(!labs.node_ids().contains("waf"));
    }

    #[tokio::test]
    async fn test_learning_path_connects_two_entities() {
        let service = test_service().await;
        seed_graph(&service).await;
        service
            .import_graph(
                &[Node::new("sqlmap", NodeType::Tool, "sqlmap")],
                &[Edge::new("sqli", "sqlmap", Relation::Uses)],
            )
            .await
            .unwrap();

        // Label resolution works for endpoints too
        let path = service.learning_path("waf", "sqlmap").await.unwrap().unwrap();
        let ids: Vec<&str> = path.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["waf", "sqli", "sqlmap"]);
        assert_eq!(path.hops(), 2);
    }

    #[tokio::test]
    async fn test_learning_path_missing_endpoint_and_no_path() {
        let service = test_service().await;
        seed_graph(&service).await;
        service
            .import_graph(&[Node::new("island", NodeType::Tool, "Isolated")], &[])
            .await
            .unwrap();

        let err = service.learning_path("waf", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));

        let path = service.learning_path("waf", "island").await.unwrap();
        assert!(path.is_none());
    }

    #[tokio::test]
    async fn test_techniques_by_severity_orders_and_filters() {
        let service = test_service().await;
        seed_graph(&service).await;
        service
            .import_graph(
                &[
                    Node::new("csrf", NodeType::Technique, "CSRF")
                        .with_property("severity", "low"),
                    Node::new("rce", NodeType::Technique, "RCE")
                        .with_property("severity", "critical"),
                ],
                &[],
            )
            .await
            .unwrap();

        let all = service.techniques_by_severity(None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["rce", "sqli", "csrf"]);

        let high_only = service.techniques_by_severity(Some("HIGH")).await.unwrap();
        assert_eq!(high_only.len(), 1);
        assert_eq!(high_only[0].id, "sqli");
    }

    #[tokio::test]
    async fn test_ask_question_creates_conversation_with_generated_title() {
        let service = test_service().await;
        seed_graph(&service).await;

        let (conversation, turn) = service.ask_question(None, "What is XSS?").await.unwrap();
        assert_eq!(conversation.title, "What is XSS?");
        assert!(!turn.answer.text().is_empty());

        let listed = service.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_ask_question_unknown_conversation() {
        let service = test_service().await;
        let err = service
            .ask_question(Some("missing"), "hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn test_cached_retrieval_invalidated_by_write() {
        let service = test_service().await;
        seed_graph(&service).await;

        let before = service.related_knowledge("sqli", None).await.unwrap();

        // A graph write moves the generation; the next retrieval sees it
        service
            .import_graph(
                &[Node::new("sqlmap", NodeType::Tool, "sqlmap")],
                &[Edge::new("sqli", "sqlmap", Relation::Uses)],
            )
            .await
            .unwrap();

        let after = service.related_knowledge("sqli", None).await.unwrap();
        assert!(after.nodes.len() > before.nodes.len());
        assert!(after.node_ids().contains("sqlmap"));
    }

    #[tokio::test]
    async fn test_stats() {
        let service = test_service().await;
        seed_graph(&service).await;

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
    }
}
