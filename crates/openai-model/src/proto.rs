use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolrelay_model::{MessageContent, ModelMessage, ModelRequest, ModelTool, Role};

/// One `data` payload of a streamed completion.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    // The trailing usage chunk has no choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    pub reasoning_content: Option<String>,
}

/// A fragment of a tool request. Only the first fragment of a call carries
/// its id and name, the arguments arrive in pieces.
#[derive(Debug, Deserialize)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// The body of a `/chat/completions` call, borrowing from the request it
/// was built from.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Cow<'a, str>,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    r#type: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl<'a> ChatRequest<'a> {
    pub fn new(model: &'a str, req: &'a ModelRequest) -> Self {
        let system = req.system_prompt.iter().map(|prompt| ChatMessage {
            role: "system",
            content: Cow::Borrowed(prompt),
        });
        Self {
            model,
            messages: system.chain(req.messages.iter().map(ChatMessage::from)).collect(),
            tools: req.tools.iter().map(ChatTool::from).collect(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }
}

impl<'a> From<&'a ModelMessage> for ChatMessage<'a> {
    fn from(msg: &'a ModelMessage) -> Self {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        // Message content must be a string, structured payloads go as JSON text.
        let content = match &msg.content {
            MessageContent::Text(text) => Cow::Borrowed(text.as_str()),
            MessageContent::Structured(payload) => Cow::Owned(payload.to_string()),
        };
        Self { role, content }
    }
}

impl<'a> From<&'a ModelTool> for ChatTool<'a> {
    fn from(tool: &'a ModelTool) -> Self {
        Self {
            r#type: "function",
            function: FunctionSpec {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}
