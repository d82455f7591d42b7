use serde_json::Value;
use thiserror::Error;

/// Well-known error codes used by back-ends and the dispatcher.
pub mod codes {
    /// The arguments of a tool call were not acceptable.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The back-end failed while handling the call.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Describes a tool call failure reported by a reachable back-end.
///
/// This error is recoverable: the dispatcher rewrites it into the
/// conversation and the loop carries on.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct ToolCallError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl ToolCallError {
    /// Creates a new error with the given code and message.
    #[inline]
    pub fn new<S: Into<String>>(code: i64, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a new error with the `INVALID_PARAMS` code.
    #[inline]
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Creates a new error with the `INTERNAL_ERROR` code.
    #[inline]
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// Attaches extra data to the error.
    #[inline]
    pub fn with_data(self, data: Value) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }

    /// Returns the error code.
    #[inline]
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the extra data, if any.
    #[inline]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}
