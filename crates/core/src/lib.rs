//! The tool-augmented conversation loop: catalog assembly across tool
//! back-ends, completion rounds, tool dispatch and connection cleanup.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod backend;
pub mod catalog;
pub mod conversation;
mod error;
mod model_client;
#[cfg(test)]
mod testing;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, DEFAULT_MAX_ROUNDS, FinishReason, RunOutcome,
};
pub use backend::{
    BackendConnector, BackendError, BackendSpec, BackendsConfig, EnvLookup,
    ToolBackend,
};
pub use conversation::{Conversation, HistoryMessage};
pub use error::{CompletionError, Error};
