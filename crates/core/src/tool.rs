//! Tool descriptors, invocation results and recoverable tool errors.

mod dispatcher;
mod error;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use toolrelay_model::ModelTool;

pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use error::{ToolCallError, codes};

/// Named arguments passed to a tool.
pub type Arguments = Map<String, Value>;

/// The result of calling a tool on its back-end.
pub type ToolResult = Result<Vec<ContentFragment>, ToolCallError>;

/// Describes a tool advertised by a back-end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name of the tool, unique within a catalog.
    pub name: String,
    /// Human readable description, forwarded to the model.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Converts the descriptor into the shape the model expects.
    #[inline]
    pub fn to_model_tool(&self) -> ModelTool {
        ModelTool {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// One piece of a successful tool output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentFragment {
    /// A text fragment.
    Text(String),
    /// Anything else (images, embedded resources, ...), kept verbatim.
    Other(Value),
}

impl ContentFragment {
    /// Interprets a `{type, text|payload}` object.
    ///
    /// Fragments whose type is `text` and that carry a string `text` field
    /// become [`ContentFragment::Text`], everything else is kept as is.
    pub fn from_value(value: Value) -> Self {
        let text = value
            .as_object()
            .filter(|obj| obj.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|obj| obj.get("text"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        match text {
            Some(text) => ContentFragment::Text(text),
            None => ContentFragment::Other(value),
        }
    }
}
