//! Chat session management
//!
//! Sessions live in a [`SessionStore`] that mirrors the whole session list
//! to a single-key [`SessionStorage`] after every change.

pub mod model;
pub mod storage;
pub mod store;

pub use model::{
    derive_title, AnalysisMetrics, AssistantUpdate, ChatSession, Message, MessageId, ModelKind,
    Role, SessionId, Source, DEFAULT_TITLE,
};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, DEFAULT_STORAGE_KEY};
pub use store::{SessionStore, SharedStore, StoreView};
