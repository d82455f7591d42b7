use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Child;
use tokio::sync::Mutex;
use toolrelay_core::tool::{
    Arguments, ContentFragment, ToolCallError, ToolDescriptor, ToolResult,
};
use toolrelay_core::{BackendError, ToolBackend};

use crate::error::TransportError;
use crate::proto::{CallToolResult, ListToolsResult, PROTOCOL_VERSION};
use crate::transport::Transport;

/// How long a back-end gets to exit on its own once its input is closed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A tool back-end reached through a [`Transport`].
///
/// When the back-end runs in a child process, the process is owned by this
/// value and stopped by [`close`](ToolBackend::close).
pub struct StdioBackend {
    id: String,
    transport: Transport,
    child: Mutex<Option<Child>>,
}

impl StdioBackend {
    /// Wraps a transport. `child` is the process at the other end, if any.
    pub fn new<S: Into<String>>(
        id: S,
        transport: Transport,
        child: Option<Child>,
    ) -> Self {
        Self {
            id: id.into(),
            transport,
            child: Mutex::new(child),
        }
    }

    /// Performs the protocol handshake. Must be called once before any
    /// other request.
    pub async fn initialize(&self) -> Result<(), TransportError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "toolrelay",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.transport.request("initialize", Some(params)).await?;
        let server_info = result.get("serverInfo").unwrap_or(&Value::Null);
        debug!("back-end {} initialized: {server_info}", self.id);
        self.transport
            .notify("notifications/initialized", None)
            .await
    }

    async fn fetch_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let mut tools = vec![];
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let result = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)?;
            tools.extend(page.tools);

            let Some(next) = page.next_cursor.filter(|next| !next.is_empty())
            else {
                return Ok(tools);
            };
            if !seen_cursors.insert(next.clone()) {
                warn!(
                    "back-end {} repeated the tool list cursor {next:?}, \
                     stopping after {} tool(s)",
                    self.id,
                    tools.len()
                );
                return Ok(tools);
            }
            cursor = Some(next);
        }
    }
}

#[async_trait]
impl ToolBackend for StdioBackend {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        self.fetch_tools().await.map_err(|err| {
            BackendError::with_source(
                format!("failed to list tools of {}", self.id),
                err,
            )
        })
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> ToolResult {
        let params = json!({ "name": name, "arguments": arguments });
        let result = match self.transport.request("tools/call", Some(params)).await
        {
            Ok(result) => result,
            Err(TransportError::Rpc(error)) => {
                let err = ToolCallError::new(error.code, error.message);
                return Err(match error.data {
                    Some(data) => err.with_data(data),
                    None => err,
                });
            }
            Err(err) => return Err(ToolCallError::internal_error(err.to_string())),
        };

        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|err| ToolCallError::internal_error(err.to_string()))?;
        let fragments: Vec<_> = result
            .content
            .into_iter()
            .map(ContentFragment::from_value)
            .collect();
        if !result.is_error {
            return Ok(fragments);
        }

        // The tool ran and reported a failure in its output.
        let message = fragments
            .iter()
            .filter_map(|fragment| match fragment {
                ContentFragment::Text(text) => Some(text.as_str()),
                ContentFragment::Other(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Err(ToolCallError::internal_error(message))
    }

    async fn close(&self) -> Result<(), BackendError> {
        if let Err(err) = self.transport.shutdown().await {
            debug!("back-end {} input already closed: {err}", self.id);
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("back-end {} exited: {status}", self.id);
                Ok(())
            }
            Ok(Err(err)) => Err(BackendError::with_source(
                format!("failed to wait for {}", self.id),
                err,
            )),
            Err(_) => {
                warn!("back-end {} did not exit in time, killing it", self.id);
                child.kill().await.map_err(|err| {
                    BackendError::with_source(
                        format!("failed to kill {}", self.id),
                        err,
                    )
                })
            }
        }
    }
}
