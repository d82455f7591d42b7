//! The contract between the tool loop and a completion service.
//!
//! A completion takes a system prompt, the conversation turns and the tool
//! list ([`ModelRequest`]) and yields exactly one model message, streamed as
//! ordered text and tool-request events ([`ModelResponse`]). Wire formats
//! live in the provider crates.

#![deny(missing_docs)]

mod provider;
mod request;
mod response;

pub use provider::*;
pub use request::*;
pub use response::*;
