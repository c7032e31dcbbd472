//! Conversation and turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retrieval::ContextBundle;

/// Maximum characters of the first question used as a generated title
const TITLE_MAX_CHARS: usize = 40;

/// A conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation with the given title
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generate a conversation title from its first question
///
/// Takes a prefix truncated on a character boundary, so multi-byte text
/// never splits mid-character.
pub fn title_from_question(question: &str) -> String {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// One question/answer exchange in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique identifier
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// The user's question
    pub question: String,
    /// The generated answer
    pub answer: Answer,
    /// The context bundle the answer was grounded in
    pub context: ContextBundle,
    /// When the turn was recorded
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(
        conversation_id: impl Into<String>,
        question: impl Into<String>,
        answer: Answer,
        context: ContextBundle,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            question: question.into(),
            answer,
            context,
            created_at: Utc::now(),
        }
    }
}

/// A generated answer
///
/// Structured answers carry the modular sections the model was asked for;
/// anything that fails section validation is kept verbatim as narrative
/// text. Neither form is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Answer {
    /// Modular sections parsed from a structured model reply
    Structured(AnswerSections),
    /// Free-form prose
    Narrative(String),
}

impl Answer {
    /// Render the answer as display text
    pub fn text(&self) -> String {
        match self {
            Answer::Narrative(text) => text.clone(),
            Answer::Structured(sections) => sections.to_text(),
        }
    }

    /// Whether this is a structured answer
    pub fn is_structured(&self) -> bool {
        matches!(self, Answer::Structured(_))
    }
}

/// Named sections of a structured answer
///
/// Field aliases accept the section keys the model is prompted to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSections {
    /// What the vulnerability or topic is
    #[serde(alias = "vulnerability_introduction")]
    pub introduction: String,
    /// How it works
    #[serde(alias = "vulnerability_principle")]
    pub mechanism: String,
    /// Notable real-world cases
    #[serde(alias = "classic_cases")]
    pub cases: String,
    /// How to defend against it
    #[serde(alias = "preventive_measures")]
    pub mitigations: String,
    /// Where to practice safely
    #[serde(alias = "practice_range")]
    pub practice: String,
    /// Further reading
    #[serde(default, alias = "relevant_links")]
    pub links: Vec<AnswerLink>,
}

impl AnswerSections {
    /// Render all sections as plain text
    pub fn to_text(&self) -> String {
        let mut parts = vec![
            self.introduction.clone(),
            self.mechanism.clone(),
            self.cases.clone(),
            self.mitigations.clone(),
            self.practice.clone(),
        ];
        parts.retain(|p| !p.is_empty());

        if !self.links.is_empty() {
            let links = self
                .links
                .iter()
                .map(|l| format!("{}: {}", l.name, l.url))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(links);
        }

        parts.join("\n\n")
    }
}

/// A named reference link in a structured answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerLink {
    /// Link text
    pub name: String,
    /// Link target
    pub url: String,
}
