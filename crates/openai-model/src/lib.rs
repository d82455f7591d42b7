//! A completion provider for OpenAI-compatible chat completion APIs.
//!
//! Every request is streamed. The provider reads the server-sent events,
//! assembles tool requests from their fragments and hands the message to
//! the loop as ordered [`ModelResponseEvent`]s.
//!
//! [`ModelResponseEvent`]: toolrelay_model::ModelResponseEvent

#[macro_use]
extern crate tracing;

mod proto;
mod response;
mod sse;

use std::fmt::{self, Debug, Formatter};

use mime::Mime;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use toolrelay_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use response::OpenAIResponse;
use sse::EventStream;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5.2";

/// Error type for [`OpenAIProvider`].
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or the stream could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with an error status.
    #[error("server returned {status}: {body}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The response body, usually a JSON error object.
        body: String,
    },
    /// The server answered with something other than an event stream.
    #[error("expected an event stream, got content type {0:?}")]
    ContentType(Option<String>),
    /// The event stream itself is broken.
    #[error("malformed event stream: {0}")]
    Stream(&'static str),
    /// An event carried something other than a completion chunk.
    #[error("malformed completion chunk: {0}")]
    Chunk(#[from] serde_json::Error),
    /// The content filter stopped the message.
    #[error("the response was blocked by the content filter")]
    ContentFiltered,
}

impl ModelProviderError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Status { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                ErrorKind::RateLimitExceeded
            }
            Error::ContentFiltered => ErrorKind::Moderated,
            _ => ErrorKind::Other,
        }
    }
}

/// Talks to the `/chat/completions` endpoint of an OpenAI-compatible
/// service.
///
/// Cloning is cheap, clones share the HTTP connection pool.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Creates a provider for the public OpenAI API.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Sets the model name.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Points the provider at another compatible service, e.g.
    /// `http://localhost:8080/v1`.
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Debug for OpenAIProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = proto::ChatRequest::new(&self.model, req);
        trace!(
            "sending {} turn(s) and {} tool(s) to {}",
            req.messages.len(),
            req.tools.len(),
            self.model
        );
        let pending = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();

        async move {
            let resp = pending.await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Status { status, body });
            }
            expect_event_stream(resp.headers())?;
            Ok(OpenAIResponse::new(EventStream::new(resp)))
        }
    }
}

fn expect_event_stream(headers: &HeaderMap) -> Result<(), Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let is_event_stream = content_type
        .and_then(|value| value.parse::<Mime>().ok())
        .is_some_and(|mime| mime.essence_str() == mime::TEXT_EVENT_STREAM);
    if is_event_stream {
        Ok(())
    } else {
        Err(Error::ContentType(content_type.map(ToOwned::to_owned)))
    }
}
