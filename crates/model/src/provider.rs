use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// How a completion call failed, as far as the loop cares.
///
/// Every kind is fatal for the run. The kind only helps callers decide
/// what to tell the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The service refused to produce the message for policy reasons.
    Moderated,
    /// The service asked us to slow down.
    RateLimitExceeded,
    /// Transport, protocol and every other failure.
    Other,
}

impl ErrorKind {
    /// Returns a short lowercase label, used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Moderated => "moderated",
            ErrorKind::RateLimitExceeded => "rate limit exceeded",
            ErrorKind::Other => "other",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while sending a request or reading its response.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Classifies the failure.
    fn kind(&self) -> ErrorKind;
}

/// A completion service.
///
/// One call to [`send_request`](Self::send_request) is one completion: the
/// whole conversation and the tool list go out, one model message comes
/// back as a [`ModelResponse`]. Providers keep no conversation state
/// between calls and never retry on their own, a failed call is returned
/// to the caller as is.
pub trait ModelProvider: Send + Sync {
    /// The error type of both the call and the response.
    type Error: ModelProviderError;

    /// The streamed model message.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a completion call.
    ///
    /// The returned future owns everything it needs, so it can outlive
    /// both `self` and `req`.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
