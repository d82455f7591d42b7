//! In-memory back-ends for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::backend::{BackendConnector, BackendError, BackendSpec, ToolBackend};
use crate::tool::{Arguments, ContentFragment, ToolDescriptor, ToolResult};

type Handler = Box<dyn Fn(&str, &Arguments) -> ToolResult + Send + Sync>;

pub(crate) struct FakeBackend {
    tools: Vec<ToolDescriptor>,
    handler: Handler,
    delay: Option<Duration>,
    fail_list: bool,
    fail_close: bool,
    calls: Mutex<Vec<(String, Arguments)>>,
    closes: AtomicUsize,
}

impl FakeBackend {
    pub fn new<I: IntoIterator<Item = &'static str>>(tool_names: I) -> Self {
        let tools = tool_names
            .into_iter()
            .map(|name| ToolDescriptor {
                name: name.to_owned(),
                description: format!("The {name} tool"),
                input_schema: json!({ "type": "object" }),
            })
            .collect();
        Self {
            tools,
            handler: Box::new(|name, _| {
                Ok(vec![ContentFragment::Text(format!("{name} done"))])
            }),
            delay: None,
            fail_list: false,
            fail_close: false,
            calls: Mutex::default(),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&str, &Arguments) -> ToolResult + Send + Sync + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Arguments)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBackend for FakeBackend {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        if self.fail_list {
            return Err(BackendError::new("listing refused"));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> ToolResult {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), arguments.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(name, &arguments)
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BackendError::new("already gone"));
        }
        Ok(())
    }
}

/// Hands out registered fake back-ends by spec id, refusing unknown ids.
#[derive(Default)]
pub(crate) struct FakeConnector {
    backends: HashMap<String, Arc<FakeBackend>>,
    connected: Mutex<Vec<BackendSpec>>,
}

impl FakeConnector {
    pub fn with_backend(mut self, id: &str, backend: Arc<FakeBackend>) -> Self {
        self.backends.insert(id.to_owned(), backend);
        self
    }

    pub fn connected(&self) -> Vec<BackendSpec> {
        self.connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendConnector for FakeConnector {
    async fn connect(
        &self,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        self.connected.lock().unwrap().push(spec.clone());
        match self.backends.get(&spec.id) {
            Some(backend) => Ok(backend.clone()),
            None => Err(BackendError::new("connection refused")),
        }
    }
}
