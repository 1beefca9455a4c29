//! Chat loop for Veritas
//!
//! This crate connects the session store to a response producer: it appends
//! prompts, streams replies into placeholder messages and reports progress
//! as [`ChatEvent`]s.

pub mod chat_loop;
pub mod context;
pub mod events;

pub use chat_loop::{ChatLoop, ChatSettings, IgnoreReason, SendOutcome, ANALYSIS_ERROR_TEXT};
pub use context::ContextBuilder;
pub use events::ChatEvent;
