//! Prompt rendering
//!
//! Builds the system and user messages for one question: the grounding
//! context as numbered entries, the recent history, then the question.

use crate::chat::Turn;
use crate::llm::Message;
use crate::retrieval::ContextBundle;

/// How the model is asked to shape its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    /// Request the structured section schema
    Structured,
    /// Request plain prose
    Narrative,
}

const STRUCTURED_SYSTEM_PROMPT: &str = r#"You are a security-domain AI assistant. Answer strictly as a JSON object, without markdown code fences. The object must contain exactly these fields; use "N/A" when a field has no relevant information:
{
    "vulnerability_introduction": "what the vulnerability is",
    "vulnerability_principle": "how it works",
    "classic_cases": "notable real-world cases",
    "preventive_measures": "how to defend against it",
    "practice_range": "where to practice safely",
    "relevant_links": [
        {"name": "link text", "url": "link target"}
    ]
}
Keep the answer accurate, professional and easy to follow."#;

const NARRATIVE_SYSTEM_PROMPT: &str = "You are a security-domain AI assistant helping users learn \
network security. Answer in plain natural language, not JSON. Keep the answer accurate, \
professional and grounded in the provided context.";

/// Render a context bundle as numbered knowledge entries
pub fn render_context(bundle: &ContextBundle) -> String {
    if bundle.is_empty() {
        return "No relevant knowledge found in the graph.".to_string();
    }

    let mut parts = vec!["Relevant knowledge retrieved from the security graph:\n".to_string()];

    for (idx, scored) in bundle.nodes.iter().enumerate() {
        let node = &scored.node;
        let mut entry = format!("\n{}. 【{}】{}", idx + 1, node.node_type, node.label);
        if let Some(severity) = node.severity() {
            entry.push_str(&format!(" [severity: {}]", severity));
        }
        if let Some(description) = node.description() {
            entry.push_str(&format!("\n   Description: {}", description));
        }
        if let Some(url) = node.url() {
            entry.push_str(&format!("\n   Link: {}", url));
        }
        parts.push(entry);
    }

    parts.join("")
}

/// Render recent history as a transcript block
fn render_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut parts = vec!["Recent conversation:".to_string()];
    for turn in history {
        parts.push(format!("User: {}", turn.question));
        parts.push(format!("Assistant: {}", turn.answer.text()));
    }
    parts.join("\n")
}

/// Build the chat messages for one question
pub fn build_messages(
    bundle: &ContextBundle,
    history: &[Turn],
    question: &str,
    mode: AnswerMode,
) -> Vec<Message> {
    let system_prompt = match mode {
        AnswerMode::Structured => STRUCTURED_SYSTEM_PROMPT,
        AnswerMode::Narrative => NARRATIVE_SYSTEM_PROMPT,
    };

    let history_block = render_history(history);
    let context_block = render_context(bundle);

    let user_prompt = format!(
        "{}\n\nQuestion: {}\n\n{}\n\nAnswer based on the knowledge above and the conversation history.",
        history_block, question, context_block
    );

    vec![
        Message::system(system_prompt),
        Message::user(user_prompt.trim().to_string()),
    ]
}
