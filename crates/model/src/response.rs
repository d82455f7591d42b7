use std::future::poll_fn;
use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// One model message, delivered as a stream of events.
///
/// The message content is the event sequence itself: consecutive
/// [`ModelResponseEvent::MessageDelta`]s make up one text segment and
/// every [`ModelResponseEvent::ToolCall`] is a segment of its own, in the
/// order the model produced them. A [`ModelResponseEvent::Completed`]
/// event closes the message.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type of the provider.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// Returns `Ready(Ok(None))` once the stream is over, and keeps doing
    /// so when polled again. An error ends the stream as well; callers
    /// should not poll after one.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Waits for the next event of `response`.
///
/// A convenience over [`ModelResponse::poll_next_event`] for async code.
pub async fn next_event<R: ModelResponse>(
    mut response: Pin<&mut R>,
) -> Result<Option<ModelResponseEvent>, R::Error> {
    poll_fn(|cx| response.as_mut().poll_next_event(cx)).await
}

/// Why the model stopped writing the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The message ends with tool requests.
    ToolCalls,
    /// The message is an answer.
    Stop,
}

/// The model asking for a tool to be run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier assigned by the model, echoed back in failure reports.
    pub id: String,
    /// Name of a tool from the request's tool list, hopefully.
    pub name: String,
    /// The arguments. The model is asked for an object but nothing
    /// guarantees it.
    pub arguments: Value,
}

/// One piece of a streamed model message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// More text.
    MessageDelta(String),
    /// A complete tool request.
    ToolCall(ToolCallRequest),
    /// The message is complete.
    Completed(ModelFinishReason),
}
