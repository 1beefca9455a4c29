//! Context builder for assembling analysis requests

use veritas_core::session::{ChatSession, Message, ModelKind};
use veritas_providers::AnalysisRequest;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Builds the producer input from a session's conversation
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    history_limit: usize,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Keep only the most recent `limit` messages
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history_limit: limit,
        }
    }

    /// Prior messages, oldest first, skipping replies still being produced
    pub fn build_history(&self, session: &ChatSession) -> Vec<Message> {
        let settled: Vec<&Message> = session.messages.iter().filter(|m| !m.is_loading).collect();
        let skip = settled.len().saturating_sub(self.history_limit);
        settled.into_iter().skip(skip).cloned().collect()
    }

    /// Build the request for `prompt` against the session as it was before
    /// the prompt was appended
    pub fn build_request(
        &self,
        session: &ChatSession,
        prompt: &str,
        model: ModelKind,
        live_search: bool,
    ) -> AnalysisRequest {
        AnalysisRequest::new(model, prompt)
            .with_history(self.build_history(session))
            .with_live_search(live_search)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
