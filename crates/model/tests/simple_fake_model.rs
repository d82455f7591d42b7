use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use serde_json::json;
use toolrelay_model::{
    ErrorKind, MessageContent, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ModelTool, Role, ToolCallRequest, next_event,
};

#[derive(Debug)]
struct EmptyConversation;

impl Display for EmptyConversation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("the conversation has no turns")
    }
}

impl std::error::Error for EmptyConversation {}

impl ModelProviderError for EmptyConversation {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Yields its events one by one, returning `Pending` before each of them.
struct ScriptedMessage {
    events: VecDeque<ModelResponseEvent>,
    parked: bool,
}

impl ModelResponse for ScriptedMessage {
    type Error = EmptyConversation;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            return Poll::Ready(Ok(None));
        }
        if !this.parked {
            this.parked = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        this.parked = false;
        Poll::Ready(Ok(this.events.pop_front()))
    }
}

/// Requests a tool when the user names one, describes structured turns
/// and echoes everything else.
struct ToolMinded;

impl ToolMinded {
    fn answer(req: &ModelRequest) -> Vec<ModelResponseEvent> {
        let Some(last) = req.messages.last() else {
            return vec![];
        };
        let reply = |text: String| {
            vec![
                ModelResponseEvent::MessageDelta(text),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        };

        match (&last.role, &last.content) {
            (Role::User, MessageContent::Text(text)) => {
                let tool = req.tools.iter().find(|tool| text.contains(&tool.name));
                match tool {
                    Some(tool) => vec![
                        ModelResponseEvent::MessageDelta(format!(
                            "Calling {}.",
                            tool.name
                        )),
                        ModelResponseEvent::ToolCall(ToolCallRequest {
                            id: format!("call_{}", req.messages.len()),
                            name: tool.name.clone(),
                            arguments: json!({ "input": text }),
                        }),
                        ModelResponseEvent::Completed(
                            ModelFinishReason::ToolCalls,
                        ),
                    ],
                    None => reply(format!("Echo: {text}")),
                }
            }
            (Role::User, MessageContent::Structured(payload)) => {
                let kind = payload["type"].as_str().unwrap_or("unknown");
                reply(format!("Got a {kind} payload."))
            }
            (Role::Assistant, _) => reply("Anything else?".to_owned()),
        }
    }
}

impl ModelProvider for ToolMinded {
    type Error = EmptyConversation;
    type Response = ScriptedMessage;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = if req.messages.is_empty() {
            Err(EmptyConversation)
        } else {
            Ok(ScriptedMessage {
                events: Self::answer(req).into(),
                parked: false,
            })
        };
        ready(result)
    }
}

async fn complete(
    provider: &ToolMinded,
    req: &ModelRequest,
) -> Vec<ModelResponseEvent> {
    let mut response = pin!(provider.send_request(req).await.unwrap());
    let mut events = vec![];
    while let Some(event) = next_event(response.as_mut()).await.unwrap() {
        events.push(event);
    }
    // Finished responses stay finished.
    assert_eq!(next_event(response.as_mut()).await.unwrap(), None);
    events
}

mod tests {
    use super::*;

    fn weather_tool() -> ModelTool {
        ModelTool {
            name: "weather".to_owned(),
            description: "Looks up the weather".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": { "input": { "type": "string" } }
            }),
        }
    }

    #[tokio::test]
    async fn test_tool_request_then_structured_output() {
        let provider = ToolMinded;
        let mut req = ModelRequest {
            system_prompt: Some("Use tools when asked.".to_owned()),
            messages: vec![ModelMessage::user("weather in Tokyo?")],
            tools: vec![weather_tool()],
        };

        let events = complete(&provider, &req).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("Calling weather.".to_owned()),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_1".to_owned(),
                    name: "weather".to_owned(),
                    arguments: json!({ "input": "weather in Tokyo?" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );

        req.messages.push(ModelMessage::assistant("Calling weather."));
        req.messages.push(ModelMessage::user_structured(
            json!({ "type": "image", "mimeType": "image/png" }),
        ));
        let events = complete(&provider, &req).await;
        assert_eq!(
            events.first(),
            Some(&ModelResponseEvent::MessageDelta(
                "Got a image payload.".to_owned()
            ))
        );
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_plain_echo_without_tools() {
        let req = ModelRequest {
            messages: vec![ModelMessage::user("weather in Tokyo?")],
            ..Default::default()
        };
        let events = complete(&ToolMinded, &req).await;
        assert_eq!(
            events[0],
            ModelResponseEvent::MessageDelta("Echo: weather in Tokyo?".to_owned())
        );
    }

    #[tokio::test]
    async fn test_error() {
        let result = ToolMinded.send_request(&ModelRequest::default()).await;
        let Err(err) = result else {
            panic!("an empty conversation must be refused");
        };
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "the conversation has no turns");
    }
}
