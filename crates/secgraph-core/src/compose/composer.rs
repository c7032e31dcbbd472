//! Answer composer
//!
//! Drives the completion collaborator for one question: render the
//! prompt, call the model under a hard timeout, retry once on transient
//! failure, then validate the reply into an [`Answer`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chat::{Answer, AnswerSections, Turn};
use crate::compose::prompt::{AnswerMode, build_messages};
use crate::error::{Error, Result};
use crate::llm::CompletionClient;
use crate::retrieval::ContextBundle;

/// User-facing text persisted when generation fails after retry
pub const FAILURE_NOTICE: &str =
    "Sorry, an answer could not be generated right now. Your question has been saved; please try again later.";

/// Attempts per question: one call plus one retry
const MAX_GENERATION_ATTEMPTS: u32 = 2;

/// Composer configuration
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Hard timeout for one model call
    pub timeout: Duration,
    /// How many recent turns to include in the prompt
    pub history_turns: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            history_turns: 2,
        }
    }
}

/// Generates answers through the completion collaborator
pub struct AnswerComposer {
    client: Arc<dyn CompletionClient>,
    config: ComposerConfig,
}

impl AnswerComposer {
    /// Create a composer with default configuration
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self::with_config(client, ComposerConfig::default())
    }

    /// Create a composer with the given configuration
    pub fn with_config(client: Arc<dyn CompletionClient>, config: ComposerConfig) -> Self {
        Self { client, config }
    }

    /// The composer's configuration
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose an answer for one question
    ///
    /// The model call runs under the configured timeout; a timeout or
    /// transient failure is retried once. After the retry the question is
    /// not answerable right now and `GenerationFailed` is surfaced.
    pub async fn compose(
        &self,
        bundle: &ContextBundle,
        history: &[Turn],
        question: &str,
        mode: AnswerMode,
    ) -> Result<Answer> {
        let messages = build_messages(bundle, history, question, mode);

        let mut last_failure = String::new();

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            match tokio::time::timeout(self.config.timeout, self.client.complete(messages.clone()))
                .await
            {
                Ok(Ok(reply)) => {
                    debug!(attempt = attempt, chars = reply.len(), "Completion received");
                    return Ok(parse_answer(&reply));
                }
                Ok(Err(e)) if e.is_transient() && attempt < MAX_GENERATION_ATTEMPTS => {
                    warn!(attempt = attempt, error = %e, "Completion failed, retrying");
                    last_failure = e.to_string();
                }
                Ok(Err(e)) => {
                    return Err(Error::GenerationFailed(e.to_string()));
                }
                Err(_) if attempt < MAX_GENERATION_ATTEMPTS => {
                    warn!(
                        attempt = attempt,
                        timeout_secs = self.config.timeout.as_secs(),
                        "Completion timed out, retrying"
                    );
                    last_failure = "model call timed out".to_string();
                }
                Err(_) => {
                    return Err(Error::GenerationFailed("model call timed out".to_string()));
                }
            }
        }

        Err(Error::GenerationFailed(last_failure))
    }
}

/// Validate a model reply into an [`Answer`]
///
/// Optional ```json fences are stripped; a reply that validates against
/// the section schema becomes structured, anything else is kept verbatim
/// as narrative. Neither outcome is an error.
pub fn parse_answer(reply: &str) -> Answer {
    let candidate = strip_code_fences(reply);

    match serde_json::from_str::<AnswerSections>(candidate) {
        Ok(sections) => Answer::Structured(sections),
        Err(_) => Answer::Narrative(reply.trim().to_string()),
    }
}

/// Strip a surrounding ``` or ```json fence, if present
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
