//! Chat loop: turns user intents into store mutations and producer runs

use crate::context::ContextBuilder;
use crate::events::ChatEvent;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use veritas_core::session::{
    AssistantUpdate, MessageId, ModelKind, SessionId, SharedStore, StoreView,
};
use veritas_providers::{ProducerError, ResponseProducer};

/// Reply text shown when analysis fails
pub const ANALYSIS_ERROR_TEXT: &str = "Error: Unable to analyze sources. Please try again.";

/// Settings passed through to the producer on every send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub model: ModelKind,
    pub live_search: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            live_search: true,
        }
    }
}

/// Why a send was dropped without touching the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyPrompt,
    NoActiveSession,
    /// A reply is already streaming in this session
    Busy,
}

/// Result of [`ChatLoop::send_message`]
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Completed {
        session_id: SessionId,
        message_id: MessageId,
    },
    /// The reply was replaced by [`ANALYSIS_ERROR_TEXT`]
    Failed {
        session_id: SessionId,
        message_id: MessageId,
        error: String,
    },
    Ignored(IgnoreReason),
}

impl SendOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, SendOutcome::Ignored(_))
    }
}

/// Coordinates the session store with a response producer
///
/// Store mutations happen under a short lock that is always released
/// before awaiting the producer, so UI readers never wait on a stream.
pub struct ChatLoop {
    store: SharedStore,
    producer: Arc<dyn ResponseProducer>,
    context: ContextBuilder,
    settings: RwLock<ChatSettings>,
}

impl ChatLoop {
    pub fn new(
        store: SharedStore,
        producer: Arc<dyn ResponseProducer>,
        settings: ChatSettings,
    ) -> Self {
        store.lock().set_default_model(settings.model);
        Self {
            store,
            producer,
            context: ContextBuilder::new(),
            settings: RwLock::new(settings),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn settings(&self) -> ChatSettings {
        *self.settings.read()
    }

    /// Model for the next send and for sessions created from now on
    pub fn set_model(&self, model: ModelKind) {
        self.settings.write().model = model;
        self.store.lock().set_default_model(model);
        info!(model = %model, "Model changed");
    }

    pub fn set_live_search(&self, enabled: bool) {
        self.settings.write().live_search = enabled;
        info!(live_search = enabled, "Live search toggled");
    }

    pub fn view(&self) -> StoreView {
        self.store.lock().view()
    }

    pub fn new_chat(&self) -> SessionId {
        self.store.lock().create_session()
    }

    pub fn select_session(&self, id: &str) -> bool {
        self.store.lock().select_session(id)
    }

    pub fn delete_session(&self, id: &str) -> bool {
        self.store.lock().delete_session(id)
    }

    /// Send a prompt to the current session and stream the reply into it
    ///
    /// Empty prompts, a missing current session and a session that is
    /// already streaming are ignored. Producer failures end the exchange
    /// with [`ANALYSIS_ERROR_TEXT`]; the loading flag is cleared either way.
    pub async fn send_message(
        &self,
        text: &str,
        event_tx: Option<&mpsc::UnboundedSender<ChatEvent>>,
    ) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored(IgnoreReason::EmptyPrompt);
        }
        let settings = self.settings();

        // check-and-append under one lock so two sends cannot both pass
        let (session_id, message_id, request) = {
            let mut store = self.store.lock();
            let Some(session) = store.active_session() else {
                return SendOutcome::Ignored(IgnoreReason::NoActiveSession);
            };
            if session.is_busy() {
                debug!(session_id = %session.id, "Send ignored, reply in flight");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            let session_id = session.id.clone();
            let request =
                self.context
                    .build_request(session, text, settings.model, settings.live_search);

            if store.append_user_message(&session_id, text).is_none() {
                return SendOutcome::Ignored(IgnoreReason::NoActiveSession);
            }
            let Some(message_id) = store.append_assistant_placeholder(&session_id) else {
                return SendOutcome::Ignored(IgnoreReason::Busy);
            };
            (session_id, message_id, request)
        };

        info!(
            session_id = %session_id,
            model = %settings.model,
            live_search = settings.live_search,
            producer = self.producer.name(),
            "Starting analysis"
        );
        emit(
            event_tx,
            ChatEvent::Started {
                session_id: session_id.clone(),
                message_id: message_id.clone(),
            },
        );

        match self
            .stream_reply(&session_id, &message_id, request, event_tx)
            .await
        {
            Ok(content) => {
                emit(
                    event_tx,
                    ChatEvent::Completed {
                        session_id: session_id.clone(),
                        message_id: message_id.clone(),
                        content,
                    },
                );
                SendOutcome::Completed {
                    session_id,
                    message_id,
                }
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Analysis failed");
                let update = AssistantUpdate::partial(ANALYSIS_ERROR_TEXT).finished();
                self.apply(&session_id, &message_id, &update);
                emit(
                    event_tx,
                    ChatEvent::Error {
                        message: e.to_string(),
                    },
                );
                SendOutcome::Failed {
                    session_id,
                    message_id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Drive the producer stream into the placeholder; returns the final text
    async fn stream_reply(
        &self,
        session_id: &str,
        message_id: &str,
        request: veritas_providers::AnalysisRequest,
        event_tx: Option<&mpsc::UnboundedSender<ChatEvent>>,
    ) -> Result<String, ProducerError> {
        let mut stream = self.producer.produce(request).await?;
        let mut last = AssistantUpdate::default();

        while let Some(event) = stream.next().await {
            let event = event?;
            let is_final = event.is_final();
            let update = event.into_update();

            let delta = update
                .content
                .strip_prefix(last.content.as_str())
                .unwrap_or(&update.content);
            if !delta.is_empty() {
                emit(
                    event_tx,
                    ChatEvent::AssistantDelta {
                        text: delta.to_string(),
                    },
                );
            }

            last = update;
            if is_final {
                break;
            }
            self.apply(session_id, message_id, &last);
        }

        let content = last.content.clone();
        self.apply(session_id, message_id, &last.finished());
        debug!(session_id = %session_id, chars = content.chars().count(), "Analysis finished");
        Ok(content)
    }

    fn apply(&self, session_id: &str, message_id: &str, update: &AssistantUpdate) {
        if !self
            .store
            .lock()
            .apply_assistant_update(session_id, message_id, update)
        {
            warn!(
                session_id = %session_id,
                message_id = %message_id,
                "Reply target is gone, update dropped"
            );
        }
    }
}

fn emit(event_tx: Option<&mpsc::UnboundedSender<ChatEvent>>, event: ChatEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use veritas_core::session::{derive_title, MemoryStorage, Role, SessionStore};
    use veritas_providers::{
        AnalysisEvent, AnalysisRequest, MockAnalyst, ProducerResult, UpdateStream,
    };

    fn shared_store() -> (SharedStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        let store = SessionStore::init(storage.clone(), ModelKind::Fast).into_shared();
        (store, storage)
    }

    fn mock_loop() -> (ChatLoop, MemoryStorage) {
        let (store, storage) = shared_store();
        let producer = Arc::new(MockAnalyst::with_delay(Duration::ZERO));
        (
            ChatLoop::new(store, producer, ChatSettings::default()),
            storage,
        )
    }

    /// Fails either before streaming or after one partial
    struct FailingProducer {
        mid_stream: bool,
    }

    #[async_trait]
    impl ResponseProducer for FailingProducer {
        async fn produce(&self, _request: AnalysisRequest) -> ProducerResult<UpdateStream> {
            if !self.mid_stream {
                return Err(ProducerError::Unavailable("offline".to_string()));
            }
            let events = vec![
                Ok(AnalysisEvent::Partial {
                    text: "Partial".to_string(),
                }),
                Err(ProducerError::Stream("connection reset".to_string())),
            ];
            Ok(Box::pin(stream::iter(events)))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Holds its only event until the test adds a permit
    struct GatedProducer {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ResponseProducer for GatedProducer {
        async fn produce(&self, _request: AnalysisRequest) -> ProducerResult<UpdateStream> {
            let gate = self.gate.clone();
            let event = stream::once(async move {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| ProducerError::Stream(e.to_string()))?;
                permit.forget();
                Ok::<_, ProducerError>(AnalysisEvent::Completed {
                    text: "done".to_string(),
                    sources: None,
                    metrics: None,
                })
            });
            Ok(Box::pin(event))
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_send_streams_reply_into_session() {
        let (chat, storage) = mock_loop();
        let outcome = chat.send_message("test topic", None).await;

        let SendOutcome::Completed {
            session_id,
            message_id,
        } = outcome
        else {
            panic!("expected completion, got {:?}", outcome);
        };

        let store = chat.store().lock();
        let session = store.session(&session_id).unwrap();
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[2].role, Role::User);
        assert_eq!(session.title, "test topic");

        let reply = session.message(&message_id).unwrap();
        assert!(!reply.is_loading);
        assert_eq!(reply.content, veritas_providers::mock_response("test topic"));
        assert_eq!(reply.grounding_sources.as_ref().unwrap().len(), 2);
        assert_eq!(reply.metrics.as_ref().unwrap().confidence_score, Some(75.0));
        assert!(!session.is_busy());

        // the durable copy holds the finished reply
        let persisted = storage.payload().unwrap();
        assert!(persisted.contains("\"confidenceScore\":75"));
        assert!(!persisted.contains("\"isLoading\":true"));
    }

    #[tokio::test]
    async fn test_event_order() {
        let (chat, _storage) = mock_loop();
        let (tx, mut rx) = mpsc::unbounded_channel();
        chat.send_message("test topic", Some(&tx)).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(ChatEvent::Started { .. })));
        let Some(ChatEvent::Completed { content, .. }) = events.last() else {
            panic!("expected completion last");
        };
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::AssistantDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(&streamed, content);
    }

    #[tokio::test]
    async fn test_empty_prompt_ignored() {
        let (chat, storage) = mock_loop();
        let writes = storage.write_count();
        let outcome = chat.send_message("   ", None).await;

        assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::EmptyPrompt));
        assert_eq!(chat.view().active_session.unwrap().messages.len(), 2);
        assert_eq!(storage.write_count(), writes);
    }

    #[tokio::test]
    async fn test_prompt_stored_as_typed() {
        let (chat, _storage) = mock_loop();
        chat.send_message("  padded topic ", None).await;

        let session = chat.view().active_session.unwrap();
        assert_eq!(session.messages[2].content, "  padded topic ");
        assert_eq!(session.title, derive_title("  padded topic "));
        assert!(session.messages[3]
            .content
            .contains("\"  padded topic \""));
    }

    #[tokio::test]
    async fn test_title_frozen_after_first_prompt() {
        let (chat, _storage) = mock_loop();
        chat.send_message("Election results and polarization in coverage", None)
            .await;
        chat.send_message("Follow-up question", None).await;

        let session = chat.view().active_session.unwrap();
        assert_eq!(session.title, "Election results and polarizat...");
        assert_eq!(session.user_message_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_before_stream_sets_error_text() {
        let (store, _storage) = shared_store();
        let chat = ChatLoop::new(
            store,
            Arc::new(FailingProducer { mid_stream: false }),
            ChatSettings::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = chat.send_message("anything", Some(&tx)).await;
        let SendOutcome::Failed { message_id, .. } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };

        let session = chat.view().active_session.unwrap();
        let reply = session.message(&message_id).unwrap();
        assert_eq!(reply.content, ANALYSIS_ERROR_TEXT);
        assert_eq!(reply.role, Role::Assistant);
        assert!(!reply.is_loading);

        drop(tx);
        let mut saw_error = false;
        while let Some(event) = rx.recv().await {
            saw_error |= matches!(event, ChatEvent::Error { .. });
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_failure_mid_stream_replaces_partial_text() {
        let (store, _storage) = shared_store();
        let chat = ChatLoop::new(
            store,
            Arc::new(FailingProducer { mid_stream: true }),
            ChatSettings::default(),
        );

        let outcome = chat.send_message("anything", None).await;
        let SendOutcome::Failed {
            message_id, error, ..
        } = outcome
        else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert!(error.contains("connection reset"));

        let session = chat.view().active_session.unwrap();
        let reply = session.message(&message_id).unwrap();
        assert_eq!(reply.content, ANALYSIS_ERROR_TEXT);
        assert!(!reply.is_loading);
        assert!(!session.is_busy());

        // the session accepts the next prompt
        let next = chat.send_message("again", None).await;
        assert!(!next.is_ignored());
    }

    #[tokio::test]
    async fn test_send_while_streaming_is_ignored() {
        let (store, _storage) = shared_store();
        let gate = Arc::new(Semaphore::new(0));
        let chat = Arc::new(ChatLoop::new(
            store,
            Arc::new(GatedProducer { gate: gate.clone() }),
            ChatSettings::default(),
        ));

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send_message("first", None).await })
        };

        let session_id = chat.view().current_session_id.unwrap();
        for _ in 0..100 {
            if chat.store().lock().is_busy(&session_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(chat.store().lock().is_busy(&session_id));
        let count_before = chat.view().active_session.unwrap().messages.len();

        let second = chat.send_message("second", None).await;
        assert_eq!(second, SendOutcome::Ignored(IgnoreReason::Busy));
        assert_eq!(
            chat.view().active_session.unwrap().messages.len(),
            count_before
        );

        gate.add_permits(1);
        let first = first.await.unwrap();
        assert!(matches!(first, SendOutcome::Completed { .. }));
        assert!(!chat.store().lock().is_busy(&session_id));
    }

    #[tokio::test]
    async fn test_other_session_can_send_while_one_streams() {
        let (store, _storage) = shared_store();
        let gate = Arc::new(Semaphore::new(0));
        let chat = Arc::new(ChatLoop::new(
            store,
            Arc::new(GatedProducer { gate: gate.clone() }),
            ChatSettings::default(),
        ));
        let busy_id = chat.view().current_session_id.unwrap();

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send_message("first", None).await })
        };
        for _ in 0..100 {
            if chat.store().lock().is_busy(&busy_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let other_id = chat.new_chat();
        assert_ne!(other_id, busy_id);
        let second = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send_message("second", None).await })
        };
        for _ in 0..100 {
            if chat.store().lock().is_busy(&other_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(chat.store().lock().is_busy(&other_id));

        gate.add_permits(2);
        assert!(matches!(first.await.unwrap(), SendOutcome::Completed { .. }));
        assert!(matches!(second.await.unwrap(), SendOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_settings_flow_into_store() {
        let (chat, _storage) = mock_loop();
        chat.set_model(ModelKind::Reasoning);
        chat.set_live_search(false);

        assert_eq!(
            chat.settings(),
            ChatSettings {
                model: ModelKind::Reasoning,
                live_search: false,
            }
        );
        let id = chat.new_chat();
        let store = chat.store().lock();
        assert_eq!(store.session(&id).unwrap().model, ModelKind::Reasoning);
    }

    #[tokio::test]
    async fn test_delete_last_session_leaves_fresh_one() {
        let (chat, _storage) = mock_loop();
        let id = chat.view().current_session_id.unwrap();
        assert!(chat.delete_session(&id));

        let view = chat.view();
        assert_eq!(view.sessions.len(), 1);
        assert_ne!(view.current_session_id.as_deref(), Some(id.as_str()));
        assert_eq!(view.active_session.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_select_unknown_session_is_noop() {
        let (chat, _storage) = mock_loop();
        let current = chat.view().current_session_id;
        assert!(!chat.select_session("missing"));
        assert_eq!(chat.view().current_session_id, current);
    }
}
