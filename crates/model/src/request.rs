use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelRequest {
    /// The system instructions, sent apart from the conversation.
    pub system_prompt: Option<String>,
    /// The conversation turns, in chronological order.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// The author of a message.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anything not produced by the model, including tool output.
    User,
    /// Text produced by the model.
    Assistant,
}

/// The content of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// A structured payload, e.g. a non-text tool output fragment.
    Structured(Value),
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Who authored the message.
    pub role: Role,
    /// What the message says.
    pub content: MessageContent,
}

impl ModelMessage {
    /// Creates a user text message.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Creates an assistant text message.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Creates a user message carrying a structured payload.
    #[inline]
    pub fn user_structured(payload: Value) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Structured(payload),
        }
    }

    /// Returns the text of this message, if it is a text message.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Structured(_) => None,
        }
    }
}

/// A tool offered to the model for this completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTool {
    /// The name the model uses to request the tool.
    pub name: String,
    /// What the tool does, in the back-end's words.
    pub description: String,
    /// JSON schema of the arguments object, as advertised by the back-end.
    pub parameters: Value,
}
