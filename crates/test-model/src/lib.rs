//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use toolrelay_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

use preset::ScriptStep;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        let delay = this.delay;
        let pending = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(pending.as_mut().poll(cx));
        this.sleep = None;

        let idx = this.event_idx;
        if idx > this.events.len() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }
        this.event_idx += 1;

        let Some(event) = this.events.get(idx) else {
            let has_tool_call = this
                .events
                .iter()
                .any(|event| matches!(event, PresetEvent::ToolCall(_)));
            return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                if has_tool_call {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                },
            ))));
        };
        let event = match event {
            PresetEvent::MessageDelta(msg) => {
                ModelResponseEvent::MessageDelta(msg.clone())
            }
            PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req.clone()),
        };
        Poll::Ready(Ok(Some(event)))
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Steps are consumed in the order
/// requests arrive, regardless of their content. If there are no enough
/// steps in the script, an error will be returned.
///
/// Clones share the call counter and the request log, so a clone kept by
/// the test can observe what the agent sent. The script itself is copied,
/// add all steps before cloning.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Vec<ScriptStep>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.script.push(ScriptStep::Respond(preset));
    }

    #[inline]
    pub fn add_failure_step(&mut self, kind: ErrorKind) {
        self.script.push(ScriptStep::Fail(kind));
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns how many requests have been sent so far.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns a copy of every request sent so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let step_idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let result = match self.script.get(step_idx) {
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }),
            Some(ScriptStep::Fail(kind)) => Err(Error {
                message: "scripted failure",
                kind: *kind,
            }),
            Some(ScriptStep::Respond(preset)) => Ok(TestModelResponse {
                events: preset.events.clone(),
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}
