use serde::Serialize;
use veritas_core::session::{MessageId, SessionId};

/// Progress of one exchange, for UI consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// User message and placeholder are in the session
    Started {
        session_id: SessionId,
        message_id: MessageId,
    },
    /// Text appended since the previous update
    AssistantDelta { text: String },
    /// Reply finalized with its sources and metrics
    Completed {
        session_id: SessionId,
        message_id: MessageId,
        content: String,
    },
    /// Producer failed; the reply holds the fixed error text
    Error { message: String },
}
