use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use serde_json::Value;
use toolrelay_model::{
    ModelFinishReason, ModelResponse, ModelResponseEvent, ToolCallRequest,
};

use crate::Error;
use crate::proto::{StreamChunk, ToolCallDelta};
use crate::sse::EventStream;

/// A tool request whose fragments are still arriving.
#[derive(Default)]
struct PartialToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn into_request(self) -> ToolCallRequest {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Null
        } else {
            // Unparsable arguments go through as text and fail in dispatch.
            match serde_json::from_str(&self.arguments) {
                Ok(arguments) => arguments,
                Err(_) => Value::String(self.arguments),
            }
        };
        ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

/// Turns completion chunks into response events.
///
/// Text goes out as soon as it arrives. A tool request is held until it is
/// complete: when the next one starts, when text follows it or when the
/// choice finishes.
#[derive(Default)]
struct Assembler {
    id: Option<String>,
    partial: Option<PartialToolCall>,
    requested_tools: bool,
    finish: Option<ModelFinishReason>,
}

impl Assembler {
    fn feed(
        &mut self,
        chunk: StreamChunk,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let id = self.id.get_or_insert_with(|| chunk.id.clone());
        if *id != chunk.id {
            return Err(Error::Stream("chunk id changed mid-stream"));
        }

        let mut events = vec![];
        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content {
                trace!("reasoning: {reasoning}");
            }
            if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
                self.flush(&mut events);
                events.push(ModelResponseEvent::MessageDelta(text));
            }
            for fragment in delta.tool_calls.into_iter().flatten() {
                self.merge(fragment, &mut events);
            }
            if let Some(reason) = choice.finish_reason {
                self.flush(&mut events);
                self.finish = Some(match reason.as_str() {
                    "tool_calls" => ModelFinishReason::ToolCalls,
                    "content_filter" => return Err(Error::ContentFiltered),
                    _ => ModelFinishReason::Stop,
                });
            }
        }
        Ok(events)
    }

    fn merge(
        &mut self,
        fragment: ToolCallDelta,
        events: &mut Vec<ModelResponseEvent>,
    ) {
        let index = fragment.index.unwrap_or_default();
        let new_id = fragment.id.filter(|id| !id.is_empty());
        let starts_new_call = self.partial.as_ref().is_some_and(|partial| {
            partial.index != index
                || new_id
                    .as_ref()
                    .is_some_and(|id| !partial.id.is_empty() && *id != partial.id)
        });
        if starts_new_call {
            self.flush(events);
        }

        let partial = self.partial.get_or_insert_with(|| PartialToolCall {
            index,
            ..Default::default()
        });
        if let Some(id) = new_id {
            partial.id = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                partial.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                partial.arguments.push_str(&arguments);
            }
        }
    }

    fn flush(&mut self, events: &mut Vec<ModelResponseEvent>) {
        if let Some(partial) = self.partial.take() {
            self.requested_tools = true;
            events.push(ModelResponseEvent::ToolCall(partial.into_request()));
        }
    }

    fn finish(&mut self) -> Vec<ModelResponseEvent> {
        let mut events = vec![];
        self.flush(&mut events);
        let reason = self.finish.take().unwrap_or_else(|| {
            debug!("the stream ended without a finish reason");
            if self.requested_tools {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            }
        });
        events.push(ModelResponseEvent::Completed(reason));
        events
    }
}

struct Reader {
    events: EventStream,
    assembler: Assembler,
    done: bool,
}

impl Reader {
    /// Reads until some events are ready. An empty batch ends the message.
    async fn next_batch(&mut self) -> Result<Vec<ModelResponseEvent>, Error> {
        while !self.done {
            let batch = match self.events.next_data().await? {
                Some(data) if data != "[DONE]" => {
                    self.assembler.feed(serde_json::from_str(&data)?)?
                }
                _ => {
                    self.done = true;
                    self.assembler.finish()
                }
            };
            if !batch.is_empty() {
                return Ok(batch);
            }
        }
        Ok(vec![])
    }

    async fn pull(mut self) -> (Self, Result<Vec<ModelResponseEvent>, Error>) {
        let batch = self.next_batch().await;
        (self, batch)
    }
}

type Pull = Pin<
    Box<
        dyn Future<Output = (Reader, Result<Vec<ModelResponseEvent>, Error>)>
            + Send,
    >,
>;

/// A streamed chat completion.
///
/// The message ends after the first error.
pub struct OpenAIResponse {
    ready: VecDeque<ModelResponseEvent>,
    pull: Option<Pull>,
}

impl OpenAIResponse {
    pub(crate) fn new(events: EventStream) -> Self {
        let reader = Reader {
            events,
            assembler: Assembler::default(),
            done: false,
        };
        Self {
            ready: VecDeque::new(),
            pull: Some(Box::pin(reader.pull())),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(event) = this.ready.pop_front() {
            return Poll::Ready(Ok(Some(event)));
        }
        let Some(pull) = this.pull.as_mut() else {
            return Poll::Ready(Ok(None));
        };
        let (reader, batch) = ready!(pull.as_mut().poll(cx));
        this.pull = None;
        let mut batch = match batch {
            Ok(batch) => VecDeque::from(batch),
            Err(err) => return Poll::Ready(Err(err)),
        };
        let Some(first) = batch.pop_front() else {
            return Poll::Ready(Ok(None));
        };
        this.ready = batch;
        this.pull = Some(Box::pin(reader.pull()));
        Poll::Ready(Ok(Some(first)))
    }
}
