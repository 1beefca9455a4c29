//! Base trait for response producers

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;
use veritas_core::session::{AnalysisMetrics, AssistantUpdate, Message, ModelKind, Source};

/// Error type for producer operations
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Producer unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

pub type ProducerResult<T> = Result<T, ProducerError>;

/// Lazy, finite, non-restartable sequence of analysis events
pub type UpdateStream = Pin<Box<dyn Stream<Item = ProducerResult<AnalysisEvent>> + Send>>;

/// Input for one analysis
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub model: ModelKind,
    /// Prior conversation, oldest first
    pub history: Vec<Message>,
    pub prompt: String,
    /// Whether the producer may search the live web
    pub live_search: bool,
}

impl AnalysisRequest {
    pub fn new(model: ModelKind, prompt: impl Into<String>) -> Self {
        Self {
            model,
            history: Vec::new(),
            prompt: prompt.into(),
            live_search: false,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_live_search(mut self, enabled: bool) -> Self {
        self.live_search = enabled;
        self
    }
}

/// Streaming event emitted by producers
///
/// Only the terminal [`AnalysisEvent::Completed`] carries sources and
/// metrics; every event carries the cumulative text so far.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    Partial {
        text: String,
    },
    Completed {
        text: String,
        sources: Option<Vec<Source>>,
        metrics: Option<AnalysisMetrics>,
    },
}

impl AnalysisEvent {
    pub fn text(&self) -> &str {
        match self {
            AnalysisEvent::Partial { text } | AnalysisEvent::Completed { text, .. } => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, AnalysisEvent::Completed { .. })
    }

    /// Message update for this event, with scores clamped to percentages.
    /// The loading flag is left to the caller.
    pub fn into_update(self) -> AssistantUpdate {
        match self {
            AnalysisEvent::Partial { text } => AssistantUpdate::partial(text),
            AnalysisEvent::Completed {
                text,
                sources,
                metrics,
            } => AssistantUpdate {
                content: text,
                sources,
                metrics: metrics.map(AnalysisMetrics::normalized),
                done: false,
            },
        }
    }
}

/// Trait for response producers
#[async_trait]
pub trait ResponseProducer: Send + Sync {
    /// Start an analysis and return its event stream
    async fn produce(&self, request: AnalysisRequest) -> ProducerResult<UpdateStream>;

    /// Drain an analysis and return its terminal event.
    ///
    /// Default behavior consumes [`ResponseProducer::produce`]; a stream that
    /// ends without a terminal event yields a `Completed` with the last text.
    async fn produce_final(&self, request: AnalysisRequest) -> ProducerResult<AnalysisEvent> {
        let mut stream = self.produce(request).await?;
        let mut last_text = String::new();
        while let Some(event) = stream.next().await {
            let event = event?;
            if event.is_final() {
                return Ok(event);
            }
            last_text = event.text().to_string();
        }
        Ok(AnalysisEvent::Completed {
            text: last_text,
            sources: None,
            metrics: None,
        })
    }

    /// Short name used in logs
    fn name(&self) -> &str;
}
