//! Mock analyst that streams a canned response word by word
//!
//! Stands in for a networked model backend. The delay between words plays
//! the part of the gap between frames arriving on a real connection.

use crate::base::{
    AnalysisEvent, AnalysisRequest, ProducerError, ProducerResult, ResponseProducer, UpdateStream,
};
use async_trait::async_trait;
use futures::stream;
use std::time::Duration;
use tracing::debug;
use veritas_core::session::{AnalysisMetrics, Source};

/// Default pause between streamed words
pub const DEFAULT_TOKEN_DELAY: Duration = Duration::from_millis(30);

/// Canned analysis for `prompt`
pub fn mock_response(prompt: &str) -> String {
    format!(
        r#"Based on my analysis of multiple sources, here's what I found about "{prompt}":

**Key Findings:**
This is a placeholder response. In a real implementation, this would connect to the Gemini API and stream the response in real-time.

**Source Analysis:**
- Mainstream sources would be analyzed here
- Alternative sources would provide additional perspectives
- Bias indicators would be identified

**Truthline Assessment:**
The analysis would conclude with a confidence score and agreement metrics."#
    )
}

fn mock_sources() -> Vec<Source> {
    vec![
        Source::new("Example Source 1", "https://example.com/1").with_snippet("Sample snippet..."),
        Source::new("Example Source 2", "https://example.com/2")
            .with_snippet("Another snippet..."),
    ]
}

fn mock_metrics() -> AnalysisMetrics {
    AnalysisMetrics {
        confidence_score: Some(75.0),
        agreement_score: Some(68.0),
        sources_analyzed: Some(5),
        bias_indicators: None,
    }
}

struct TokenState {
    words: std::vec::IntoIter<String>,
    text: String,
    emitted: usize,
    finished: bool,
}

/// Producer that ignores model, history and live search
#[derive(Debug, Clone)]
pub struct MockAnalyst {
    delay: Duration,
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self {
            delay: DEFAULT_TOKEN_DELAY,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for MockAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseProducer for MockAnalyst {
    async fn produce(&self, request: AnalysisRequest) -> ProducerResult<UpdateStream> {
        if request.prompt.trim().is_empty() {
            return Err(ProducerError::InvalidRequest("empty prompt".to_string()));
        }

        let words: Vec<String> = mock_response(&request.prompt)
            .split(' ')
            .map(str::to_string)
            .collect();
        debug!(
            model = %request.model,
            live_search = request.live_search,
            history = request.history.len(),
            tokens = words.len(),
            "Streaming mock analysis"
        );

        let delay = self.delay;
        let state = TokenState {
            words: words.into_iter(),
            text: String::new(),
            emitted: 0,
            finished: false,
        };

        let events = stream::unfold(state, move |mut state| async move {
            if state.finished {
                return None;
            }
            if state.emitted > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            state.emitted += 1;

            let event = match state.words.next() {
                Some(word) => {
                    if !state.text.is_empty() {
                        state.text.push(' ');
                    }
                    state.text.push_str(&word);
                    AnalysisEvent::Partial {
                        text: state.text.clone(),
                    }
                }
                None => {
                    state.finished = true;
                    AnalysisEvent::Completed {
                        text: state.text.clone(),
                        sources: Some(mock_sources()),
                        metrics: Some(mock_metrics()),
                    }
                }
            };
            Some((Ok(event), state))
        });

        Ok(Box::pin(events))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
