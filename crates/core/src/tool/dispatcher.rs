use std::time::Duration;

use serde_json::{Map, Value, json};
use toolrelay_model::{ModelMessage, ToolCallRequest};
use tracing::Instrument;

use super::{Arguments, ContentFragment, ToolCallError};
use crate::catalog::Catalog;
use crate::conversation::Conversation;
use crate::error::{Error, with_deadline};

/// What happened to a dispatched tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The tool succeeded and its output was appended.
    Completed {
        /// The output, one user turn per fragment.
        fragments: Vec<ContentFragment>,
    },
    /// The tool failed and the failure was appended as a user turn.
    Failed(ToolCallError),
}

/// Routes tool invocation requests to the back-end that owns the tool.
///
/// The dispatcher writes results into the conversation but never opens or
/// closes connections.
pub struct ToolDispatcher<'a> {
    catalog: &'a Catalog,
    call_timeout: Option<Duration>,
}

impl<'a> ToolDispatcher<'a> {
    /// Creates a dispatcher over `catalog`.
    #[inline]
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            call_timeout: None,
        }
    }

    /// Sets a deadline for each tool call.
    #[inline]
    pub fn with_call_timeout(self, call_timeout: Option<Duration>) -> Self {
        Self {
            call_timeout,
            ..self
        }
    }

    /// Invokes the tool named by `request` and folds the result into
    /// `conversation`.
    ///
    /// A tool that no back-end provides is fatal. A failure reported by the
    /// back-end is not: it becomes a user turn quoting the request and the
    /// error message, so the model can react to it.
    pub async fn dispatch(
        &self,
        request: &ToolCallRequest,
        conversation: &mut Conversation,
    ) -> Result<DispatchOutcome, Error> {
        let Some(backend) = self.catalog.backend(&request.name) else {
            return Err(Error::UnknownTool {
                name: request.name.clone(),
            });
        };

        let span = debug_span!(
            "tool call",
            tool = %request.name,
            id = %request.id,
            backend = %backend.id()
        );
        let result = match arguments_of(request) {
            Ok(arguments) => {
                let call = backend
                    .call_tool(&request.name, arguments)
                    .instrument(span);
                with_deadline(self.call_timeout, "tool call", call).await?
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(fragments) => {
                debug!(
                    "tool {} returned {} fragment(s)",
                    request.name,
                    fragments.len()
                );
                for fragment in &fragments {
                    conversation.push(match fragment {
                        ContentFragment::Text(text) => {
                            ModelMessage::user(text.as_str())
                        }
                        ContentFragment::Other(payload) => {
                            ModelMessage::user_structured(payload.clone())
                        }
                    });
                }
                Ok(DispatchOutcome::Completed { fragments })
            }
            Err(err) => {
                warn!("tool {} failed: {err}", request.name);
                conversation.push(ModelMessage::user(failure_text(request, &err)));
                Ok(DispatchOutcome::Failed(err))
            }
        }
    }
}

fn arguments_of(request: &ToolCallRequest) -> Result<Arguments, ToolCallError> {
    match &request.arguments {
        Value::Object(arguments) => Ok(arguments.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(ToolCallError::invalid_params(format!(
            "arguments must be an object, got: {other}"
        ))),
    }
}

/// Renders the user turn reporting a failed call.
fn failure_text(request: &ToolCallRequest, err: &ToolCallError) -> String {
    let tool_use = json!({
        "type": "tool_use",
        "id": request.id,
        "name": request.name,
        "input": request.arguments,
    });
    format!("ToolUse: {tool_use}, Error: {}", err.message())
}
