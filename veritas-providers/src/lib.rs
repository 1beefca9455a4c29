//! Response producers for Veritas
//!
//! A producer turns a prompt plus conversation history into a stream of
//! cumulative analysis events.

pub mod base;
pub mod mock;

pub use base::{
    AnalysisEvent, AnalysisRequest, ProducerError, ProducerResult, ResponseProducer, UpdateStream,
};
pub use mock::{mock_response, MockAnalyst, DEFAULT_TOKEN_DELAY};
