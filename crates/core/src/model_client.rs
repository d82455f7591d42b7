use std::pin::{Pin, pin};
use std::sync::Arc;

use toolrelay_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponseEvent, ToolCallRequest, next_event,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// The request is sent once. Failures are returned as is, they are
    /// never retried here.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        (self.handler_fn)(req).await
    }
}

/// One piece of a model message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseSegment {
    /// A run of text.
    Text(String),
    /// A request to invoke a tool.
    ToolCall(ToolCallRequest),
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// The message content, in the order it was produced.
    pub segments: Vec<ResponseSegment>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelClientResponse {
    fn push_delta(&mut self, delta: String) {
        if delta.is_empty() {
            return;
        }
        if let Some(ResponseSegment::Text(text)) = self.segments.last_mut() {
            text.push_str(&delta);
        } else {
            self.segments.push(ResponseSegment::Text(delta));
        }
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut response = ModelClientResponse::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err = next_event(pinned_resp.as_mut()).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                response.push_delta(msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                response.segments.push(ResponseSegment::ToolCall(req));
            }
            ModelResponseEvent::Completed(reason) => {
                response.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(response)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolrelay_model::{ErrorKind, ModelMessage};
    use toolrelay_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn tool_call(id: &str) -> PresetEvent {
        PresetEvent::ToolCall(ToolCallRequest {
            id: id.to_owned(),
            name: "weather".to_owned(),
            arguments: json!({ "location": "Tokyo" }),
        })
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_assistant_response_step(
                PresetResponse::with_events([
                    PresetEvent::MessageDelta("How ".to_owned()),
                    PresetEvent::MessageDelta("are ".to_owned()),
                    PresetEvent::MessageDelta("you?".to_owned()),
                ]),
            );
        }

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let resp = model_client
                .send_request(ModelRequest {
                    messages: vec![ModelMessage::user("Hi")],
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(
                resp.segments,
                [ResponseSegment::Text("How are you?".to_owned())]
            );
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
        }
    }

    #[tokio::test]
    async fn test_segments_keep_order() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([
                PresetEvent::MessageDelta("Let me ".to_owned()),
                PresetEvent::MessageDelta("check.".to_owned()),
                tool_call("call_1"),
                PresetEvent::MessageDelta(String::new()),
                tool_call("call_2"),
                PresetEvent::MessageDelta("Done?".to_owned()),
            ]),
        );

        let model_client = ModelClient::new(model_provider);
        let resp = model_client
            .send_request(ModelRequest::default())
            .await
            .unwrap();

        assert_eq!(resp.segments.len(), 4);
        assert_eq!(
            resp.segments[0],
            ResponseSegment::Text("Let me check.".to_owned())
        );
        assert!(matches!(
            &resp.segments[1],
            ResponseSegment::ToolCall(req) if req.id == "call_1"
        ));
        assert!(matches!(
            &resp.segments[2],
            ResponseSegment::ToolCall(req) if req.id == "call_2"
        ));
        assert_eq!(resp.segments[3], ResponseSegment::Text("Done?".to_owned()));
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error_handling() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_failure_step(ErrorKind::Moderated);
        let model_client = ModelClient::new(model_provider);

        let err = model_client
            .send_request(ModelRequest::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Moderated);

        // The script is exhausted now.
        let resp_or_err = model_client.send_request(ModelRequest::default()).await;
        assert!(resp_or_err.is_err());
    }
}
