//! End-to-end tests over the public service surface: graph import,
//! retrieval, conversation flow and failure handling, all against an
//! in-memory SQLite store and a fake completion client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secgraph_core::api::KnowledgeService;
use secgraph_core::chat::Answer;
use secgraph_core::compose::{AnswerComposer, ComposerConfig, FAILURE_NOTICE};
use secgraph_core::config::Config;
use secgraph_core::graph::{Direction, Edge, GraphStore, Node, NodeType, Relation, SqliteGraphStore};
use secgraph_core::llm::{CompletionClient, Message};
use secgraph_core::retrieval::{ExpandOptions, expand, rank};
use secgraph_core::storage::Database;
use secgraph_core::{Error, Result};

struct FixedClient(String);

#[async_trait]
impl CompletionClient for FixedClient {
    async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct HangingClient;

#[async_trait]
impl CompletionClient for HangingClient {
    async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }
}

async fn service_with_client(client: Arc<dyn CompletionClient>) -> KnowledgeService {
    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteGraphStore::new(db.clone()));
    KnowledgeService::new(store, db, client, Config::default())
}

async fn service() -> KnowledgeService {
    service_with_client(Arc::new(FixedClient("a grounded answer".to_string()))).await
}

/// The sql-injection corner of the graph: one technique with a CVE, a
/// defense and a practice lab around it.
async fn seed_sqli_fixture(service: &KnowledgeService) {
    let nodes = vec![
        Node::new("sqli", NodeType::Technique, "SQL注入")
            .with_property("description", "Injection of SQL through untrusted input")
            .with_property("severity", "high"),
        Node::new("cve-2021-1234", NodeType::Cve, "CVE-2021-1234")
            .with_property("cvss", 9.8),
        Node::new("waf", NodeType::Defense, "WAF")
            .with_property("description", "Web application firewall"),
        Node::new("dvwa", NodeType::Lab, "DVWA")
            .with_property("url", "https://github.com/digininja/DVWA"),
    ];
    let edges = vec![
        Edge::new("cve-2021-1234", "sqli", Relation::Exploits),
        Edge::new("waf", "sqli", Relation::Mitigates),
        Edge::new("sqli", "dvwa", Relation::PracticesIn),
    ];
    service.import_graph(&nodes, &edges).await.unwrap();
}

#[tokio::test]
async fn test_sqli_question_retrieves_full_neighborhood() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

    let bundle = service.related_knowledge("SQL注入", None).await.unwrap();

    assert_eq!(bundle.seeds, vec!["sqli"]);
    let ids = bundle.node_ids();
    assert!(ids.contains("sqli"));
    assert!(ids.contains("cve-2021-1234"));
    assert!(ids.contains("waf"));
    assert!(ids.contains("dvwa"));
    assert!(!bundle.truncated);
    assert!(bundle.has_no_dangling_edges());

    // The seed outranks every neighbor
    assert_eq!(bundle.nodes[0].node.id, "sqli");
}

#[tokio::test]
async fn test_expansion_reports_first_arrival_hop_distance() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db);

    // s -> a -> b, plus a shortcut s -> b
    for (id, label) in [("s", "S"), ("a", "A"), ("b", "B")] {
        store
            .save_node(&Node::new(id, NodeType::Technique, label))
            .await
            .unwrap();
    }
    store.save_edge(&Edge::new("s", "a", Relation::RelatesTo)).await.unwrap();
    store.save_edge(&Edge::new("a", "b", Relation::RelatesTo)).await.unwrap();
    store.save_edge(&Edge::new("s", "b", Relation::RelatesTo)).await.unwrap();

    let seeds = vec![store.find_by_id("s").await.unwrap().unwrap()];
    let opts = ExpandOptions::default().with_depth(3);
    let expansion = expand(&store, &seeds, &opts).await.unwrap();

    let hop_of = |id: &str| {
        expansion
            .nodes
            .iter()
            .find(|n| n.node.id == id)
            .map(|n| n.hop_distance)
            .unwrap()
    };
    assert_eq!(hop_of("s"), 0);
    assert_eq!(hop_of("a"), 1);
    // Reached at depth 1 through the shortcut, never re-admitted at 2
    assert_eq!(hop_of("b"), 1);
    assert_eq!(expansion.nodes.len(), 3);
}

#[tokio::test]
async fn test_learning_path_from_defense_to_lab() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

    // waf and dvwa only connect through the technique between them
    let path = service.learning_path("waf", "dvwa").await.unwrap().unwrap();
    let ids: Vec<&str> = path.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["waf", "sqli", "dvwa"]);
    assert_eq!(
        path.relations,
        vec![Relation::Mitigates, Relation::PracticesIn]
    );
}

#[tokio::test]
async fn test_filtered_related_knowledge_answers_defense_and_lab_queries() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

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
    assert!(!defenses.node_ids().contains("cve-2021-1234"));

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
async fn test_expansion_is_idempotent() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

    let first = service.related_knowledge("sqli", Some(2)).await.unwrap();
    let second = service.related_knowledge("sqli", Some(2)).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_ranking_trim_drops_dangling_edges() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db);

    // A hub with more neighbors than the ranking budget keeps
    store
        .save_node(&Node::new("hub", NodeType::Technique, "Hub"))
        .await
        .unwrap();
    for i in 0..10 {
        let id = format!("n{i}");
        store
            .save_node(&Node::new(&id, NodeType::Tool, format!("Tool {i}")))
            .await
            .unwrap();
        store
            .save_edge(&Edge::new("hub", &id, Relation::Uses))
            .await
            .unwrap();
    }

    let seeds = vec![store.find_by_id("hub").await.unwrap().unwrap()];
    let expansion = expand(&store, &seeds, &ExpandOptions::default()).await.unwrap();

    let mut ranking = secgraph_core::retrieval::RankingConfig::default();
    ranking.max_nodes = 4;
    let bundle = rank(&["hub".to_string()], expansion, &ranking);

    assert_eq!(bundle.nodes.len(), 4);
    assert!(bundle.truncated);
    assert!(bundle.is_seed("hub"));
    assert!(bundle.has_no_dangling_edges());
}

#[tokio::test]
async fn test_node_cap_marks_truncated() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db);

    store
        .save_node(&Node::new("hub", NodeType::Technique, "Hub"))
        .await
        .unwrap();
    for i in 0..6 {
        let id = format!("n{i}");
        store
            .save_node(&Node::new(&id, NodeType::Tool, format!("Tool {i}")))
            .await
            .unwrap();
        store
            .save_edge(&Edge::new("hub", &id, Relation::Uses))
            .await
            .unwrap();
    }

    let seeds = vec![store.find_by_id("hub").await.unwrap().unwrap()];
    let opts = ExpandOptions::default().with_max_nodes(3);
    let expansion = expand(&store, &seeds, &opts).await.unwrap();

    assert_eq!(expansion.nodes.len(), 3);
    assert!(expansion.truncated);
}

#[tokio::test]
async fn test_neighbors_direction_filters() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db);

    for (id, label) in [("a", "A"), ("b", "B")] {
        store
            .save_node(&Node::new(id, NodeType::Technique, label))
            .await
            .unwrap();
    }
    store.save_edge(&Edge::new("a", "b", Relation::RelatesTo)).await.unwrap();

    let out = store.neighbors("a", None, Direction::Outgoing).await.unwrap();
    assert_eq!(out.len(), 1);
    let inc = store.neighbors("a", None, Direction::Incoming).await.unwrap();
    assert!(inc.is_empty());
}

#[tokio::test]
async fn test_ask_question_creates_and_continues_conversation() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

    let (conversation, first) = service.ask_question(None, "What is XSS?").await.unwrap();
    assert_eq!(conversation.title, "What is XSS?");
    assert_eq!(first.conversation_id, conversation.id);
    assert!(!first.answer.text().is_empty());

    let (again, second) = service
        .ask_question(Some(&conversation.id), "And how do I defend against it?")
        .await
        .unwrap();
    assert_eq!(again.id, conversation.id);
    assert_ne!(second.id, first.id);

    let turns = service.get_conversation_messages(&conversation.id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].question, "What is XSS?");
    assert_eq!(turns[1].question, "And how do I defend against it?");
}

#[tokio::test]
async fn test_turn_persists_its_context_bundle() {
    let service = service().await;
    seed_sqli_fixture(&service).await;

    let (conversation, turn) = service
        .ask_question(None, "Tell me about SQL注入")
        .await
        .unwrap();
    assert!(turn.context.node_ids().contains("sqli"));

    // The persisted copy round-trips intact
    let turns = service.get_conversation_messages(&conversation.id).await.unwrap();
    assert_eq!(turns[0].context, turn.context);
}

#[tokio::test]
async fn test_concurrent_questions_on_one_conversation_are_fifo() {
    let service = Arc::new(service().await);
    let (conversation, _) = service.ask_question(None, "q0").await.unwrap();

    let mut handles = Vec::new();
    for i in 1..5 {
        let service = service.clone();
        let id = conversation.id.clone();
        let question = format!("q{i}");
        handles.push(tokio::spawn(async move {
            service.ask_question(Some(&id), &question).await.unwrap();
        }));
        // Let the spawned task reach the gate before the next arrives
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let turns = service.get_conversation_messages(&conversation.id).await.unwrap();
    let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
    assert_eq!(questions, vec!["q0", "q1", "q2", "q3", "q4"]);
}

#[tokio::test]
async fn test_delete_conversation_is_atomic() {
    let service = service().await;
    let (conversation, _) = service.ask_question(None, "ephemeral").await.unwrap();

    service.delete_conversation(&conversation.id).await.unwrap();

    let err = service
        .get_conversation_messages(&conversation.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConversationNotFound(_)));
    assert!(service.list_conversations().await.unwrap().is_empty());

    let err = service.delete_conversation(&conversation.id).await.unwrap_err();
    assert!(matches!(err, Error::ConversationNotFound(_)));
}

#[tokio::test]
async fn test_generation_timeout_persists_failure_notice() {
    let service = service_with_client(Arc::new(HangingClient)).await.with_composer(
        AnswerComposer::with_config(
            Arc::new(HangingClient),
            ComposerConfig {
                timeout: Duration::from_millis(50),
                history_turns: 2,
            },
        ),
    );
    seed_sqli_fixture(&service).await;

    let err = service.ask_question(None, "What is SQL注入?").await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)));

    // The question survived with the user-facing notice
    let conversations = service.list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    let turns = service
        .get_conversation_messages(&conversations[0].id)
        .await
        .unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].question, "What is SQL注入?");
    assert_eq!(turns[0].answer, Answer::Narrative(FAILURE_NOTICE.to_string()));
}

#[tokio::test]
async fn test_structured_answer_round_trips_through_storage() {
    let structured = r#"{
        "vulnerability_introduction": "SQL injection lets attackers run arbitrary SQL.",
        "vulnerability_principle": "User input is concatenated into queries.",
        "classic_cases": "The 2009 Heartland breach.",
        "preventive_measures": "Parameterized queries.",
        "practice_range": "DVWA",
        "relevant_links": [{"name": "OWASP", "url": "https://owasp.org"}]
    }"#;
    let service = service_with_client(Arc::new(FixedClient(structured.to_string()))).await;
    seed_sqli_fixture(&service).await;

    let (conversation, turn) = service
        .ask_question(None, "What is SQL注入?")
        .await
        .unwrap();
    assert!(turn.answer.is_structured());

    let turns = service.get_conversation_messages(&conversation.id).await.unwrap();
    assert_eq!(turns[0].answer, turn.answer);
    match &turns[0].answer {
        Answer::Structured(sections) => {
            assert_eq!(sections.links.len(), 1);
            assert_eq!(sections.links[0].url, "https://owasp.org");
        }
        other => panic!("expected structured answer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_question_with_no_matches_still_gets_answered() {
    let service = service().await;
    // Graph left empty on purpose

    let (_, turn) = service
        .ask_question(None, "zqxwv nonsense with no graph hits")
        .await
        .unwrap();
    assert!(turn.context.is_empty());
    assert!(!turn.answer.text().is_empty());
}
