//! Core types for Veritas
//!
//! This crate owns the chat session model, the session store and its
//! durable storage, configuration loading, and logging setup used by the
//! other Veritas components.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use error::{Error, Result};
