//! Session store: the session list, the current selection and its durable
//! mirror

use super::model::{AssistantUpdate, ChatSession, Message, MessageId, ModelKind, SessionId};
use super::storage::SessionStorage;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store handle shared between the chat loop and UI consumers
pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Snapshot of the store as consumed by a UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreView {
    pub sessions: Vec<ChatSession>,
    pub current_session_id: Option<SessionId>,
    pub active_session: Option<ChatSession>,
}

/// Owns every chat session
///
/// Sessions are kept most-recently-created first and are never re-sorted.
/// Each mutation replaces a whole session value and is followed by a
/// best-effort write of the full list to storage.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    current: Option<SessionId>,
    default_model: ModelKind,
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    /// Create an empty store without reading storage
    pub fn new(storage: impl SessionStorage + 'static, default_model: ModelKind) -> Self {
        Self {
            sessions: Vec::new(),
            current: None,
            default_model,
            storage: Box::new(storage),
        }
    }

    /// Create a store and restore it from storage
    pub fn init(storage: impl SessionStorage + 'static, default_model: ModelKind) -> Self {
        let mut store = Self::new(storage, default_model);
        store.restore();
        store
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.current.as_deref().and_then(|id| self.session(id))
    }

    pub fn view(&self) -> StoreView {
        StoreView {
            sessions: self.sessions.clone(),
            current_session_id: self.current.clone(),
            active_session: self.active_session().cloned(),
        }
    }

    pub fn default_model(&self) -> ModelKind {
        self.default_model
    }

    /// Model recorded on sessions created from now on
    pub fn set_default_model(&mut self, model: ModelKind) {
        self.default_model = model;
    }

    /// Resolve a full id or a unique id prefix
    pub fn resolve_id(&self, prefix: &str) -> Option<SessionId> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(session) = self.session(prefix) {
            return Some(session.id.clone());
        }
        let mut matches = self.sessions.iter().filter(|s| s.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(session), None) => Some(session.id.clone()),
            _ => None,
        }
    }

    /// Create a seeded session at the head of the list and make it current
    pub fn create_session(&mut self) -> SessionId {
        let session = ChatSession::new(self.default_model);
        let id = session.id.clone();
        info!(session_id = %id, model = %session.model, "Created session");

        self.sessions.insert(0, session);
        self.current = Some(id.clone());
        self.persist();
        id
    }

    /// Make `id` current; unknown ids are ignored
    pub fn select_session(&mut self, id: &str) -> bool {
        if self.session(id).is_none() {
            debug!(session_id = %id, "Ignoring selection of unknown session");
            return false;
        }
        self.current = Some(id.to_string());
        true
    }

    /// Remove a session
    ///
    /// Deleting the current session selects the head of the remaining list.
    /// When nothing remains, a fresh session is created once the removal
    /// has been applied and persisted.
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            debug!(session_id = %id, "Ignoring deletion of unknown session");
            return false;
        }
        info!(session_id = %id, "Deleted session");

        if self.current.as_deref() == Some(id) {
            self.current = self.sessions.first().map(|s| s.id.clone());
        }
        self.persist();

        if self.sessions.is_empty() {
            self.create_session();
        }
        true
    }

    /// Replace a session with `f` applied to its latest stored value
    ///
    /// `f` returning `None` leaves the session untouched. Returns whether a
    /// replacement happened.
    pub fn update_session<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&ChatSession) -> Option<ChatSession>,
    {
        let Some(index) = self.sessions.iter().position(|s| s.id == id) else {
            debug!(session_id = %id, "Ignoring update of unknown session");
            return false;
        };
        let Some(next) = f(&self.sessions[index]) else {
            return false;
        };
        self.sessions[index] = next;
        self.persist();
        true
    }

    /// Whether `session_id` has an assistant reply in flight
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.session(session_id).is_some_and(ChatSession::is_busy)
    }

    /// Append a user message; the first one also names the session
    pub fn append_user_message(&mut self, session_id: &str, text: &str) -> Option<Message> {
        let message = Message::user(text);
        let appended = message.clone();
        self.update_session(session_id, move |s| Some(s.with_user_message(appended)))
            .then_some(message)
    }

    /// Append an empty loading assistant message
    ///
    /// Refused while another reply is in flight for the same session.
    pub fn append_assistant_placeholder(&mut self, session_id: &str) -> Option<MessageId> {
        if self.is_busy(session_id) {
            debug!(session_id = %session_id, "Session busy, placeholder refused");
            return None;
        }
        let placeholder = Message::placeholder();
        let id = placeholder.id.clone();
        self.update_session(session_id, move |s| Some(s.with_message(placeholder)))
            .then_some(id)
    }

    /// Replace the streamed fields of one message
    pub fn apply_assistant_update(
        &mut self,
        session_id: &str,
        message_id: &str,
        update: &AssistantUpdate,
    ) -> bool {
        self.update_session(session_id, |s| s.with_message_update(message_id, update))
    }

    /// Write the full session list to storage; failures are logged only
    pub fn persist(&self) {
        let payload = match serde_json::to_string(&self.sessions) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize sessions");
                return;
            }
        };
        if let Err(e) = self.storage.save(&payload) {
            warn!(key = self.storage.key(), error = %e, "Failed to persist sessions");
        }
    }

    /// Reload the session list from storage
    ///
    /// Missing, empty or unreadable data falls back to a single fresh session.
    pub fn restore(&mut self) {
        let payload = match self.storage.load() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(key = self.storage.key(), "No stored sessions, starting fresh");
                return self.reset();
            }
            Err(e) => {
                warn!(key = self.storage.key(), error = %e, "Failed to read stored sessions");
                return self.reset();
            }
        };

        match serde_json::from_str::<Vec<ChatSession>>(&payload) {
            Ok(sessions) if !sessions.is_empty() => {
                // no producer survives a restart
                self.sessions = sessions
                    .into_iter()
                    .map(ChatSession::without_stale_loading)
                    .collect();
                self.current = self.sessions.first().map(|s| s.id.clone());
                info!(count = self.sessions.len(), "Restored sessions");
            }
            Ok(_) => {
                info!("Stored session list is empty, starting fresh");
                self.reset();
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored sessions");
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.sessions.clear();
        self.current = None;
        self.create_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{AnalysisMetrics, Role, Source};
    use crate::session::storage::MemoryStorage;

    fn store() -> (SessionStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        (SessionStore::init(storage.clone(), ModelKind::Fast), storage)
    }

    fn assert_current_valid(store: &SessionStore) {
        assert!(!store.sessions().is_empty());
        let current = store.current_session_id().expect("a current session");
        assert!(store.session(current).is_some());
    }

    #[test]
    fn test_init_without_data_creates_seeded_session() {
        let (store, storage) = store();
        assert_eq!(store.sessions().len(), 1);
        assert_current_valid(&store);
        assert_eq!(store.active_session().unwrap().messages.len(), 2);
        assert!(storage.payload().is_some());
    }

    #[test]
    fn test_create_inserts_at_head_and_selects() {
        let (mut store, _) = store();
        let first = store.current_session_id().unwrap().to_string();
        let second = store.create_session();

        assert_eq!(store.sessions()[0].id, second);
        assert_eq!(store.sessions()[1].id, first);
        assert_eq!(store.current_session_id(), Some(second.as_str()));
    }

    #[test]
    fn test_create_uses_default_model() {
        let (mut store, _) = store();
        store.set_default_model(ModelKind::Reasoning);
        let id = store.create_session();
        assert_eq!(store.session(&id).unwrap().model, ModelKind::Reasoning);
    }

    #[test]
    fn test_select_unknown_is_noop() {
        let (mut store, _) = store();
        let current = store.current_session_id().unwrap().to_string();
        assert!(!store.select_session("nope"));
        assert_eq!(store.current_session_id(), Some(current.as_str()));
    }

    #[test]
    fn test_delete_current_selects_head() {
        let (mut store, _) = store();
        let a = store.current_session_id().unwrap().to_string();
        let b = store.create_session();
        let c = store.create_session();

        store.select_session(&b);
        assert!(store.delete_session(&b));
        assert_eq!(store.current_session_id(), Some(c.as_str()));
        assert_eq!(store.sessions().len(), 2);

        assert!(store.delete_session(&a));
        assert_eq!(store.current_session_id(), Some(c.as_str()));
    }

    #[test]
    fn test_delete_non_current_keeps_selection() {
        let (mut store, _) = store();
        let a = store.current_session_id().unwrap().to_string();
        let b = store.create_session();
        store.delete_session(&a);
        assert_eq!(store.current_session_id(), Some(b.as_str()));
    }

    #[test]
    fn test_delete_last_session_creates_fresh_one() {
        let (mut store, storage) = store();
        let only = store.current_session_id().unwrap().to_string();

        assert!(store.delete_session(&only));
        assert_eq!(store.sessions().len(), 1);
        let fresh = store.active_session().unwrap();
        assert_ne!(fresh.id, only);
        assert_eq!(fresh.messages.len(), 2);

        let stored: Vec<ChatSession> =
            serde_json::from_str(&storage.payload().unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, fresh.id);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let (mut store, storage) = store();
        let writes = storage.write_count();
        assert!(!store.delete_session("missing"));
        assert_eq!(storage.write_count(), writes);
    }

    #[test]
    fn test_create_delete_sequences_keep_one_current() {
        let (mut store, _) = store();
        for round in 0..5 {
            for _ in 0..round {
                store.create_session();
            }
            let ids: Vec<_> = store.sessions().iter().map(|s| s.id.clone()).collect();
            for id in ids.iter().rev() {
                store.delete_session(id);
                assert_current_valid(&store);
            }
        }
    }

    #[test]
    fn test_append_user_message_sets_title_once() {
        let (mut store, _) = store();
        let id = store.current_session_id().unwrap().to_string();

        let msg = store
            .append_user_message(&id, "Election results and polarization in coverage")
            .unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(store.session(&id).unwrap().title, "Election results and polarizat...");

        store.append_user_message(&id, "follow up");
        assert_eq!(store.session(&id).unwrap().title, "Election results and polarizat...");
        assert_eq!(store.session(&id).unwrap().messages.len(), 4);
    }

    #[test]
    fn test_append_to_unknown_session() {
        let (mut store, _) = store();
        assert!(store.append_user_message("missing", "hi").is_none());
        assert!(store.append_assistant_placeholder("missing").is_none());
    }

    #[test]
    fn test_single_placeholder_per_session() {
        let (mut store, _) = store();
        let id = store.current_session_id().unwrap().to_string();

        let placeholder = store.append_assistant_placeholder(&id).unwrap();
        assert!(store.is_busy(&id));
        assert!(store.append_assistant_placeholder(&id).is_none());

        store.apply_assistant_update(&id, &placeholder, &AssistantUpdate::partial("done").finished());
        assert!(!store.is_busy(&id));
        assert!(store.append_assistant_placeholder(&id).is_some());
    }

    #[test]
    fn test_apply_assistant_update_streams_then_finishes() {
        let (mut store, _) = store();
        let id = store.current_session_id().unwrap().to_string();
        let mid = store.append_assistant_placeholder(&id).unwrap();

        assert!(store.apply_assistant_update(&id, &mid, &AssistantUpdate::partial("Based")));
        assert!(store.apply_assistant_update(&id, &mid, &AssistantUpdate::partial("Based on")));
        let msg = store.session(&id).unwrap().message(&mid).unwrap().clone();
        assert_eq!(msg.content, "Based on");
        assert!(msg.is_loading);

        let last = AssistantUpdate {
            content: "Based on analysis".to_string(),
            sources: Some(vec![Source::new("S", "https://s.example")]),
            metrics: Some(AnalysisMetrics {
                confidence_score: Some(75.0),
                ..Default::default()
            }),
            done: true,
        };
        assert!(store.apply_assistant_update(&id, &mid, &last));
        let msg = store.session(&id).unwrap().message(&mid).unwrap();
        assert!(!msg.is_loading);
        assert_eq!(msg.metrics.as_ref().unwrap().confidence_score, Some(75.0));
    }

    #[test]
    fn test_apply_update_unknown_message() {
        let (mut store, _) = store();
        let id = store.current_session_id().unwrap().to_string();
        assert!(!store.apply_assistant_update(&id, "missing", &AssistantUpdate::partial("x")));
    }

    #[test]
    fn test_roundtrip_through_storage() {
        let (mut store, storage) = store();
        let id = store.current_session_id().unwrap().to_string();
        store.append_user_message(&id, "test topic");
        let mid = store.append_assistant_placeholder(&id).unwrap();
        store.apply_assistant_update(&id, &mid, &AssistantUpdate::partial("reply").finished());
        store.create_session();

        let restored = SessionStore::init(storage, ModelKind::Fast);
        assert_eq!(restored.sessions(), store.sessions());
        assert_eq!(restored.current_session_id(), Some(store.sessions()[0].id.as_str()));
    }

    #[test]
    fn test_restore_corrupt_payload_starts_fresh() {
        let storage = MemoryStorage::with_payload("{not json");
        let store = SessionStore::init(storage, ModelKind::Fast);
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.active_session().unwrap().messages.len(), 2);
    }

    #[test]
    fn test_restore_keeps_fractional_scores() {
        let payload = r#"[{
            "id": "s1",
            "title": "keep me",
            "model": "gemini-2.5-flash",
            "messages": [{
                "id": "m1",
                "role": "assistant",
                "content": "reply",
                "timestamp": 1700000000000,
                "metrics": {"confidenceScore": 72.5, "agreementScore": 140}
            }],
            "createdAt": 1700000000000,
            "updatedAt": 1700000000000
        }]"#;
        let store = SessionStore::init(MemoryStorage::with_payload(payload), ModelKind::Fast);

        assert_eq!(store.sessions().len(), 1);
        let session = store.active_session().unwrap();
        assert_eq!(session.title, "keep me");
        let metrics = session.messages[0].metrics.as_ref().unwrap();
        assert_eq!(metrics.confidence_score, Some(72.5));
        assert_eq!(metrics.agreement_score, Some(140.0));
    }

    #[test]
    fn test_restore_empty_list_starts_fresh() {
        let storage = MemoryStorage::with_payload("[]");
        let store = SessionStore::init(storage, ModelKind::Fast);
        assert_eq!(store.sessions().len(), 1);
        assert!(store.current_session_id().is_some());
    }

    #[test]
    fn test_restore_clears_stale_loading() {
        let (mut store, storage) = store();
        let id = store.current_session_id().unwrap().to_string();
        store.append_assistant_placeholder(&id).unwrap();

        let restored = SessionStore::init(storage, ModelKind::Fast);
        assert!(!restored.is_busy(&id));
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let (mut store, storage) = store();
        storage.set_fail_writes(true);

        let id = store.create_session();
        assert_eq!(store.current_session_id(), Some(id.as_str()));
        assert!(store.append_user_message(&id, "still works").is_some());
    }

    #[test]
    fn test_resolve_id_prefix() {
        let (mut store, _) = store();
        let id = store.create_session();
        assert_eq!(store.resolve_id(&id), Some(id.clone()));
        assert_eq!(store.resolve_id(&id[..8]), Some(id.clone()));
        assert_eq!(store.resolve_id(""), None);
        assert_eq!(store.resolve_id("zzzz"), None);
    }

    #[test]
    fn test_view_reflects_selection() {
        let (mut store, _) = store();
        let id = store.create_session();
        let view = store.view();
        assert_eq!(view.sessions.len(), 2);
        assert_eq!(view.current_session_id.as_deref(), Some(id.as_str()));
        assert_eq!(view.active_session.unwrap().id, id);
    }
}
