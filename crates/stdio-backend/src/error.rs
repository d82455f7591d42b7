use std::io;

use thiserror::Error;

use crate::proto::RpcError;

/// An error raised while talking to a back-end process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading from or writing to the process failed.
    #[error("failed to {action}: {source}")]
    Io {
        /// What was being done.
        action: &'static str,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// A message could not be encoded or a result could not be decoded.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// The process closed its output, it has probably exited.
    #[error("the back-end closed its output")]
    Closed,
    /// The back-end answered with a JSON-RPC error.
    #[error("back-end error [{}]: {}", .0.code, .0.message)]
    Rpc(RpcError),
    /// The response carried neither a result nor an error.
    #[error("the response has neither a result nor an error")]
    EmptyResponse,
}

impl TransportError {
    pub(crate) fn io(action: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| TransportError::Io { action, source }
    }
}
