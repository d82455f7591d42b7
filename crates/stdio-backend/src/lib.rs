//! Tool back-ends reached over the stdio of a child process.
//!
//! The child speaks line-delimited JSON-RPC 2.0: one message per line on
//! its stdin and stdout. Only the client side of the tool protocol is
//! implemented (`initialize`, `tools/list` and `tools/call`).

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod backend;
mod connector;
mod error;
mod proto;
mod transport;

pub use backend::StdioBackend;
pub use connector::StdioConnector;
pub use error::TransportError;
pub use proto::RpcError;
pub use transport::Transport;
