//! Secgraph CLI - security knowledge graph retrieval and Q&A

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use secgraph_core::api::KnowledgeService;
use secgraph_core::chat::Answer;
use secgraph_core::config::Config;
use secgraph_core::graph::{Edge, Node, NodeType, Relation, SqliteGraphStore};
use secgraph_core::llm::{CompletionClient, HttpCompletionClientBuilder, Message};
use secgraph_core::storage::Database;

#[derive(Parser)]
#[command(name = "secgraph")]
#[command(author, version, about = "Security knowledge graph retrieval and Q&A", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search knowledge nodes by text
    Search {
        /// Search text
        query: String,
        /// Restrict to one node type (cve, technique, defense, tool, lab)
        #[arg(short = 't', long)]
        node_type: Option<String>,
        /// Maximum results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the ranked neighborhood of a node
    Related {
        /// Node id or label
        entity: String,
        /// Expansion depth
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=3))]
        depth: Option<u32>,
        /// Only follow these relations (repeatable)
        #[arg(short, long)]
        relation: Vec<String>,
        /// Only include these node types (repeatable)
        #[arg(short = 't', long)]
        node_type: Vec<String>,
    },

    /// Show the shortest learning path between two topics
    Path {
        /// Starting node id or label
        from: String,
        /// Target node id or label
        to: String,
    },

    /// List techniques ranked by severity
    Techniques {
        /// Only techniques with this severity word (critical, high, medium, low)
        #[arg(short, long)]
        severity: Option<String>,
    },

    /// Ask a question grounded in the graph
    Ask {
        /// The question
        question: String,
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Manage conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Import nodes and edges from a JSON file
    Import {
        /// Path to a JSON file with "nodes" and "edges" arrays
        file: PathBuf,
    },

    /// Show graph statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List all conversations
    List,
    /// Show a conversation's turns
    Show { id: String },
    /// Delete a conversation and its turns
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// The JSON shape accepted by `secgraph import`
#[derive(serde::Deserialize)]
struct GraphFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Placeholder client for commands that never reach the model
struct UnconfiguredClient;

#[async_trait]
impl CompletionClient for UnconfiguredClient {
    async fn complete(&self, _messages: Vec<Message>) -> secgraph_core::Result<String> {
        Err(secgraph_core::Error::CompletionError(
            "API key not configured. Set SECGRAPH_API_KEY or OPENAI_API_KEY.".to_string(),
        ))
    }
}

async fn build_service(config: &Config) -> anyhow::Result<KnowledgeService> {
    let db = Database::default().await?;
    let store = Arc::new(SqliteGraphStore::new(db.clone()));

    let client: Arc<dyn CompletionClient> = match config.llm.resolved_api_key()? {
        Some(key) => Arc::new(
            HttpCompletionClientBuilder::new()
                .config(config.llm.clone())
                .api_key(key)
                .build()?,
        ),
        None => Arc::new(UnconfiguredClient),
    };

    Ok(KnowledgeService::new(store, db, client, config.clone()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("secgraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Search {
            query,
            node_type,
            limit,
        } => {
            let service = build_service(&config).await?;
            cmd_search(&service, &query, node_type.as_deref(), limit, cli.format).await
        }

        Commands::Related {
            entity,
            depth,
            relation,
            node_type,
        } => {
            let service = build_service(&config).await?;
            cmd_related(&service, &entity, depth, &relation, &node_type, cli.format).await
        }

        Commands::Path { from, to } => {
            let service = build_service(&config).await?;
            cmd_path(&service, &from, &to, cli.format).await
        }

        Commands::Techniques { severity } => {
            let service = build_service(&config).await?;
            cmd_techniques(&service, severity.as_deref(), cli.format).await
        }

        Commands::Ask {
            question,
            conversation,
        } => {
            let service = build_service(&config).await?;
            cmd_ask(
                &service,
                &config,
                &question,
                conversation.as_deref(),
                cli.format,
                cli.quiet,
            )
            .await
        }

        Commands::Conversations { action } => {
            let service = build_service(&config).await?;
            cmd_conversations(&service, action, cli.format, cli.quiet).await
        }

        Commands::Import { file } => {
            let service = build_service(&config).await?;
            cmd_import(&service, &file, cli.quiet).await
        }

        Commands::Stats => {
            let service = build_service(&config).await?;
            cmd_stats(&service, cli.format).await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(&config, cli.quiet).await,
    }
}

async fn cmd_search(
    service: &KnowledgeService,
    query: &str,
    node_type: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let node_type = node_type.map(NodeType::parse);
    let results = service.search(query, node_type.as_ref(), limit).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matches for '{}'.", query);
    } else {
        for node in results {
            let mut line = format!("  {} - 【{}】{}", node.id, node.node_type, node.label);
            if let Some(severity) = node.severity() {
                line.push_str(&format!(" [severity: {}]", severity));
            }
            println!("{}", line);
        }
    }
    Ok(())
}

async fn cmd_related(
    service: &KnowledgeService,
    entity: &str,
    depth: Option<u32>,
    relation: &[String],
    node_type: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let relations =
        (!relation.is_empty()).then(|| relation.iter().map(|r| Relation::parse(r)).collect());
    let node_types =
        (!node_type.is_empty()).then(|| node_type.iter().map(|t| NodeType::parse(t)).collect());

    let bundle = service
        .related_knowledge_filtered(entity, depth, relations, node_types)
        .await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    println!("Related knowledge for '{}':", entity);
    for scored in &bundle.nodes {
        let node = &scored.node;
        let marker = if bundle.is_seed(&node.id) { "*" } else { " " };
        println!(
            "{} {} - 【{}】{} (hop {}, relevance {:.2})",
            marker, node.id, node.node_type, node.label, scored.hop_distance, scored.relevance
        );
    }
    if !bundle.edges.is_empty() {
        println!("\nEdges:");
        for edge in &bundle.edges {
            println!("  {} -[{}]-> {}", edge.source, edge.relation, edge.target);
        }
    }
    if bundle.truncated {
        println!("\n(Results truncated; raise retrieval.max_nodes or ranking.max_nodes.)");
    }
    Ok(())
}

async fn cmd_path(
    service: &KnowledgeService,
    from: &str,
    to: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let path = service.learning_path(from, to).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&path)?);
        return Ok(());
    }

    let Some(path) = path else {
        println!("No path found from '{}' to '{}'.", from, to);
        return Ok(());
    };

    println!("Learning path ({} hops):", path.hops());
    for (i, node) in path.nodes.iter().enumerate() {
        if i > 0 {
            println!("    |  [{}]", path.relations[i - 1]);
        }
        println!("  {} - 【{}】{}", node.id, node.node_type, node.label);
    }
    Ok(())
}

async fn cmd_techniques(
    service: &KnowledgeService,
    severity: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let techniques = service.techniques_by_severity(severity).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&techniques)?);
        return Ok(());
    }

    if techniques.is_empty() {
        println!("No matching techniques.");
    } else {
        for node in techniques {
            let severity = node.severity().unwrap_or("unknown").to_string();
            println!("  {} - {} [severity: {}]", node.id, node.label, severity);
        }
    }
    Ok(())
}

async fn cmd_ask(
    service: &KnowledgeService,
    config: &Config,
    question: &str,
    conversation: Option<&str>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if config.llm.resolved_api_key()?.is_none() {
        return Err(anyhow::anyhow!(
            "API key not configured. Set SECGRAPH_API_KEY or OPENAI_API_KEY."
        ));
    }

    let (conversation, turn) = service.ask_question(conversation, question).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
        return Ok(());
    }

    if !quiet {
        println!("Conversation: {} ({})", conversation.title, conversation.id);
        println!();
    }
    print_answer(&turn.answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    match answer {
        Answer::Structured(sections) => {
            println!("Introduction:\n  {}", sections.introduction);
            println!("\nHow it works:\n  {}", sections.mechanism);
            println!("\nClassic cases:\n  {}", sections.cases);
            println!("\nPreventive measures:\n  {}", sections.mitigations);
            println!("\nWhere to practice:\n  {}", sections.practice);
            if !sections.links.is_empty() {
                println!("\nLinks:");
                for link in &sections.links {
                    println!("  {} - {}", link.name, link.url);
                }
            }
        }
        Answer::Narrative(text) => println!("{}", text),
    }
}

async fn cmd_conversations(
    service: &KnowledgeService,
    action: ConversationAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        ConversationAction::List => {
            let conversations = service.list_conversations().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&conversations)?);
            } else if conversations.is_empty() {
                println!("No conversations yet. Start one with: secgraph ask <question>");
            } else {
                for c in conversations {
                    println!(
                        "  {} - {} (updated {})",
                        c.id,
                        c.title,
                        c.updated_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        ConversationAction::Show { id } => {
            let turns = service.get_conversation_messages(&id).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&turns)?);
            } else {
                for turn in turns {
                    println!("Q: {}", turn.question);
                    print_answer(&turn.answer);
                    println!();
                }
            }
        }
        ConversationAction::Delete { id } => {
            service.delete_conversation(&id).await?;
            if !quiet {
                println!("Conversation '{}' deleted.", id);
            }
        }
    }
    Ok(())
}

async fn cmd_import(
    service: &KnowledgeService,
    file: &std::path::Path,
    quiet: bool,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let graph: GraphFile = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", file.display(), e))?;

    let (nodes, edges) = service.import_graph(&graph.nodes, &graph.edges).await?;
    if !quiet {
        println!("Imported {} nodes and {} edges.", nodes, edges);
    }
    Ok(())
}

async fn cmd_stats(service: &KnowledgeService, format: OutputFormat) -> anyhow::Result<()> {
    let stats = service.stats().await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Graph statistics:");
    println!("  Nodes: {}", stats.node_count);
    println!("  Edges: {}", stats.edge_count);
    if !stats.nodes_by_type.is_empty() {
        println!("  By type:");
        for (node_type, count) in &stats.nodes_by_type {
            println!("    {}: {}", node_type, count);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &Config, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Secgraph Health Check");
        println!("=====================");
        println!();
    }

    let mut all_ok = true;

    match config.validate() {
        Ok(()) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
        }
    }

    match config.llm.resolved_api_key() {
        Ok(Some(_)) => {
            if !quiet {
                let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                println!("[OK] API Key: Configured ({})", redacted);
            }
        }
        Ok(None) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Not configured");
                println!("     Set SECGRAPH_API_KEY or OPENAI_API_KEY environment variable");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Error - {}", e);
            }
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    match Database::default().await {
        Ok(db) => match db.health_check().await {
            Ok(()) => {
                if !quiet {
                    println!("[OK] Database: Connected");
                    println!("     Path: {}", db.path().display());

                    match db.migration_status().await {
                        Ok(status) => {
                            if status.needs_migration {
                                println!(
                                    "[!!] Database: Migrations pending (v{} -> v{})",
                                    status.current_version, status.target_version
                                );
                            } else {
                                println!("[OK] Database: Schema v{}", status.current_version);
                            }
                        }
                        Err(e) => {
                            println!("[!!] Database: Migration check failed - {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
        },
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}
