use toolrelay_model::{ModelMessage, ModelRequest, ModelTool, ToolCallRequest};

use super::{Agent, FinishReason, RunOutcome};
use crate::catalog::Catalog;
use crate::conversation::Conversation;
use crate::error::{Error, with_deadline};
use crate::model_client::{ModelClientResponse, ResponseSegment};
use crate::tool::{DispatchOutcome, ToolDispatcher};

/// Where the loop stands.
#[derive(Debug)]
pub(super) enum Stage {
    AwaitingCompletion,
    HandlingTool(ToolCallRequest),
    Done(FinishReason),
}

/// Drives one run: alternates between completion calls and tool calls
/// until the model stops asking for tools or the round limit is hit.
///
/// The controller is strictly sequential: at most one completion or tool
/// call is in flight at any time.
pub(super) struct Controller<'a> {
    agent: &'a Agent,
    dispatcher: ToolDispatcher<'a>,
    tools: Vec<ModelTool>,
    conversation: Conversation,
    completions: usize,
    rounds: usize,
}

impl<'a> Controller<'a> {
    pub fn new(
        agent: &'a Agent,
        catalog: &'a Catalog,
        conversation: Conversation,
    ) -> Self {
        Self {
            agent,
            dispatcher: ToolDispatcher::new(catalog)
                .with_call_timeout(agent.call_timeout),
            tools: catalog.definitions(),
            conversation,
            completions: 0,
            rounds: 0,
        }
    }

    pub async fn run(mut self) -> Result<RunOutcome, Error> {
        let mut stage = Stage::AwaitingCompletion;
        loop {
            trace!("stage: {stage:?}");
            stage = match stage {
                Stage::AwaitingCompletion => self.request_completion().await?,
                Stage::HandlingTool(request) => {
                    self.handle_tool(&request).await?;
                    Stage::AwaitingCompletion
                }
                Stage::Done(finish) => {
                    return Ok(RunOutcome {
                        conversation: self.conversation,
                        finish,
                        completions: self.completions,
                        rounds: self.rounds,
                    });
                }
            };
        }
    }

    async fn request_completion(&mut self) -> Result<Stage, Error> {
        let request = ModelRequest {
            system_prompt: self.agent.system_prompt.clone(),
            messages: self.conversation.turns().to_vec(),
            tools: self.tools.clone(),
        };
        self.completions += 1;

        let send = self.agent.model_client.send_request(request);
        let response = with_deadline(self.agent.call_timeout, "completion", send)
            .await?
            .map_err(|err| Error::Completion { source: err.into() })?;
        trace!("completion finished: {:?}", response.finish_reason);

        let Some(request) = classify(response, &mut self.conversation) else {
            return Ok(Stage::Done(FinishReason::Finished));
        };
        if self.rounds >= self.agent.max_rounds {
            info!(
                "round limit ({}) reached, ignoring request for tool {}",
                self.agent.max_rounds, request.name
            );
            return Ok(Stage::Done(FinishReason::RoundLimitReached));
        }
        Ok(Stage::HandlingTool(request))
    }

    async fn handle_tool(
        &mut self,
        request: &ToolCallRequest,
    ) -> Result<(), Error> {
        self.rounds += 1;
        let outcome = self
            .dispatcher
            .dispatch(request, &mut self.conversation)
            .await?;
        if let DispatchOutcome::Failed(err) = outcome {
            debug!("round {} ended with a tool error: {err}", self.rounds);
        }
        Ok(())
    }
}

/// Appends the text segments of `response` as assistant turns and picks
/// the tool request to handle.
///
/// Only the last tool request of a message is kept, earlier ones are
/// dropped with a warning.
pub(super) fn classify(
    response: ModelClientResponse,
    conversation: &mut Conversation,
) -> Option<ToolCallRequest> {
    let mut active: Option<ToolCallRequest> = None;
    let mut dropped = 0;

    for segment in response.segments {
        match segment {
            ResponseSegment::Text(text) => {
                conversation.push(ModelMessage::assistant(text));
            }
            ResponseSegment::ToolCall(request) => {
                if let Some(previous) = active.replace(request) {
                    trace!("dropping tool request {}", previous.id);
                    dropped += 1;
                }
            }
        }
    }

    if dropped > 0 {
        warn!(
            "model requested {} tools in one message, only the last one is \
             handled",
            dropped + 1
        );
    }
    active
}
