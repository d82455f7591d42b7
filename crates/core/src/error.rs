use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use thiserror::Error;
use toolrelay_model::{ErrorKind, ModelProviderError};

use crate::backend::BackendError;

/// A fatal error that aborts a run.
///
/// Recoverable tool failures never show up here, they are folded into the
/// conversation instead. Hitting the round limit is not an error either, see
/// [`FinishReason::RoundLimitReached`].
///
/// [`FinishReason::RoundLimitReached`]: crate::FinishReason::RoundLimitReached
#[derive(Debug, Error)]
pub enum Error {
    /// A configured back-end whose preconditions are met could not be
    /// reached, or refused to list its tools.
    #[error("failed to start back-end `{backend}`: {source}")]
    Startup {
        /// Identifier of the back-end spec.
        backend: String,
        /// What went wrong.
        #[source]
        source: BackendError,
    },
    /// The completion service call failed.
    #[error("completion failed ({}): {source}", .source.kind())]
    Completion {
        /// The provider's error.
        #[source]
        source: CompletionError,
    },
    /// The model asked for a tool that no back-end provides.
    #[error("no back-end provides tool `{name}`")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },
    /// A completion or tool call did not finish before its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which call timed out.
        operation: &'static str,
        /// The configured deadline.
        after: Duration,
    },
}

/// An error reported by the model provider.
///
/// Displays as the provider error and exposes the same source chain.
#[derive(Debug)]
pub struct CompletionError(Box<dyn ModelProviderError>);

impl CompletionError {
    /// Returns the kind reported by the provider.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// Returns the provider error.
    #[inline]
    pub fn provider_error(&self) -> &dyn ModelProviderError {
        self.0.as_ref()
    }
}

impl From<Box<dyn ModelProviderError>> for CompletionError {
    #[inline]
    fn from(err: Box<dyn ModelProviderError>) -> Self {
        Self(err)
    }
}

impl Display for CompletionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl StdError for CompletionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Runs `fut` under an optional deadline.
pub(crate) async fn with_deadline<F: Future>(
    deadline: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<F::Output, Error> {
    let Some(after) = deadline else {
        return Ok(fut.await);
    };
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout { operation, after })
}

#[cfg(test)]
mod tests {
    use std::future::{pending, ready};
    use std::io;

    use super::*;

    #[derive(Debug, Error)]
    #[error("upstream refused the request")]
    struct RefusedError {
        #[source]
        source: io::Error,
    }

    impl ModelProviderError for RefusedError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::RateLimitExceeded
        }
    }

    #[test]
    fn test_completion_error_keeps_source_chain() {
        let provider_err: Box<dyn ModelProviderError> = Box::new(RefusedError {
            source: io::Error::other("connection reset"),
        });
        let err = Error::Completion {
            source: provider_err.into(),
        };
        assert_eq!(
            err.to_string(),
            "completion failed (rate limit exceeded): upstream refused the request"
        );

        let Error::Completion { source } = &err else {
            unreachable!();
        };
        assert_eq!(source.kind(), ErrorKind::RateLimitExceeded);

        let chain: Vec<String> = std::iter::successors(
            StdError::source(&err),
            |&err| err.source(),
        )
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            chain,
            ["upstream refused the request", "connection reset"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline() {
        let value = with_deadline(None, "noop", ready(42)).await.unwrap();
        assert_eq!(value, 42);

        let err = with_deadline(
            Some(Duration::from_secs(5)),
            "tool call",
            pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "tool call", .. }));
        assert_eq!(err.to_string(), "tool call timed out after 5s");
    }
}
