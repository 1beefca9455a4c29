//! Session data structures
//!
//! Sessions are treated as values: every change produces a new
//! [`ChatSession`] through one of the `with_*` methods instead of mutating
//! fields in place, so a holder of an older snapshot never observes a
//! half-applied update.

use crate::utils::truncate_chars;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Unique session identifier
pub type SessionId = String;
/// Unique message identifier
pub type MessageId = String;

/// Title shown until the first user message names the session
pub const DEFAULT_TITLE: &str = "New Investigation";
/// Number of characters of the first prompt kept in the title
pub const TITLE_MAX_CHARS: usize = 30;

const SYSTEM_GREETING: &str = "System initialized. Welcome to Veritas.";
const ASSISTANT_WELCOME: &str = "I am Veritas, your bias-aware news analyst. Enter a topic, and I will search mainstream and alternative sources to provide a unified truth-line.";

/// Generate a new unique id for sessions and messages
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time at the millisecond precision used in stored data
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Derive a session title from the first user prompt
pub fn derive_title(prompt: &str) -> String {
    truncate_chars(prompt, TITLE_MAX_CHARS)
}

/// Model selector exposed to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelKind {
    /// Low-latency model
    #[default]
    #[serde(rename = "gemini-2.5-flash", alias = "fast", alias = "flash")]
    Fast,
    /// Slower model with deeper reasoning
    #[serde(rename = "gemini-3.0-pro", alias = "reasoning", alias = "pro")]
    Reasoning,
}

impl ModelKind {
    /// Wire identifier of the backing model
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Fast => "gemini-2.5-flash",
            ModelKind::Reasoning => "gemini-3.0-pro",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Fast => "Speed Model",
            ModelKind::Reasoning => "Reasoning Model",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "flash" | "gemini-2.5-flash" => Some(ModelKind::Fast),
            "reasoning" | "pro" | "gemini-3.0-pro" => Some(ModelKind::Reasoning),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::parse(s).ok_or_else(|| format!("unknown model '{}' (expected fast or reasoning)", s))
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A source cited by an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Source {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Trust metrics attached to a finished analysis
///
/// Every field is optional; `None` means the metric was not computed for
/// the message. Scores are percentages in `0.0..=100.0` and may be fractional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_analyzed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_indicators: Option<BTreeSet<String>>,
}

impl AnalysisMetrics {
    /// Clamp scores into the percentage range
    pub fn normalized(mut self) -> Self {
        self.confidence_score = self.confidence_score.map(clamp_percent);
        self.agreement_score = self.agreement_score.map(clamp_percent);
        self
    }
}

fn clamp_percent(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Message text; grows while an assistant reply streams in
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// True only while the producer has not signaled completion
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AnalysisMetrics>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: now(),
            is_loading: false,
            grounding_sources: None,
            metrics: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Empty assistant message awaiting a streamed reply
    pub fn placeholder() -> Self {
        Self {
            is_loading: true,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    /// Return a copy with the streamed fields replaced by `update`
    pub fn with_update(&self, update: &AssistantUpdate) -> Self {
        Self {
            content: update.content.clone(),
            grounding_sources: update.sources.clone(),
            metrics: update.metrics.clone(),
            is_loading: !update.done,
            ..self.clone()
        }
    }
}

/// One incremental change to an assistant message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantUpdate {
    /// Cumulative text so far
    pub content: String,
    pub sources: Option<Vec<Source>>,
    pub metrics: Option<AnalysisMetrics>,
    /// Clears the loading flag when set
    pub done: bool,
}

impl AssistantUpdate {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }
}

/// A conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    /// Frozen once derived from the first user message
    pub title: String,
    pub model: ModelKind,
    /// Insertion order is display order
    pub messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a session seeded with the system greeting and assistant welcome
    pub fn new(model: ModelKind) -> Self {
        let now = now();
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_string(),
            model,
            messages: vec![
                Message::system(SYSTEM_GREETING),
                Message::assistant(ASSISTANT_WELCOME),
            ],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// The assistant message currently being produced, if any
    pub fn loading_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_loading)
    }

    pub fn is_busy(&self) -> bool {
        self.loading_message().is_some()
    }

    /// Append a user message, deriving the title if it is the first one
    pub fn with_user_message(&self, message: Message) -> Self {
        let title = if self.user_message_count() == 0 {
            derive_title(&message.content)
        } else {
            self.title.clone()
        };
        let mut next = self.with_message(message);
        next.title = title;
        next
    }

    /// Append any message without touching the title
    pub fn with_message(&self, message: Message) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self {
            messages,
            updated_at: now(),
            ..self.clone()
        }
    }

    /// Apply a streamed update to one message; `None` when the id is unknown
    pub fn with_message_update(&self, message_id: &str, update: &AssistantUpdate) -> Option<Self> {
        let index = self.messages.iter().position(|m| m.id == message_id)?;
        let mut messages = self.messages.clone();
        messages[index] = messages[index].with_update(update);
        Some(Self {
            messages,
            updated_at: now(),
            ..self.clone()
        })
    }

    /// Copy with every loading flag cleared
    pub fn without_stale_loading(self) -> Self {
        let messages = self
            .messages
            .into_iter()
            .map(|m| Message {
                is_loading: false,
                ..m
            })
            .collect();
        Self { messages, ..self }
    }
}
