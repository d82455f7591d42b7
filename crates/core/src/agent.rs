mod builder;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::backend::{
    BackendConnector, BackendLifecycle, BackendSpec, EnvLookup,
};
use crate::catalog::CatalogBuilder;
use crate::conversation::Conversation;
use crate::error::Error;
use crate::model_client::ModelClient;
pub use builder::AgentBuilder;
use state::Controller;

/// The default number of tool rounds a run may perform.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// An agent answering conversations with the help of tool back-ends.
///
/// An agent holds configuration only. Every call to [`run`](Self::run)
/// builds its own catalog and opens its own back-end connections, so
/// concurrent runs never share a connection. Cloning is cheap.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    connector: Arc<dyn BackendConnector>,
    specs: Arc<[BackendSpec]>,
    env: EnvLookup,
    system_prompt: Option<String>,
    max_rounds: usize,
    call_timeout: Option<Duration>,
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered without asking for a tool.
    Finished,
    /// The model still wanted a tool when the round limit was reached.
    ///
    /// The conversation is usable but the last assistant text may not be
    /// a complete answer.
    RoundLimitReached,
}

/// The result of a run that did not fail.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The input conversation, extended with everything the run appended.
    pub conversation: Conversation,
    /// Why the run stopped.
    pub finish: FinishReason,
    /// How many completion calls were made.
    pub completions: usize,
    /// How many tool rounds were performed.
    pub rounds: usize,
}

impl Agent {
    /// Runs the tool loop on `conversation` until the model answers or the
    /// round limit is hit.
    ///
    /// Every back-end connection opened by the run is closed before this
    /// method returns, whether it succeeds or fails.
    pub async fn run(
        &self,
        conversation: Conversation,
    ) -> Result<RunOutcome, Error> {
        let mut lifecycle = BackendLifecycle::default();
        let result = self
            .run_with(conversation, &mut lifecycle)
            .instrument(debug_span!("agent run"))
            .await;

        let failures = lifecycle.close_all().await;
        if failures > 0 {
            debug!("{failures} back-end(s) failed to close");
        }
        match &result {
            Ok(outcome) => debug!(
                "run finished ({:?}) after {} completion(s) and {} round(s)",
                outcome.finish, outcome.completions, outcome.rounds
            ),
            Err(err) => error!("run aborted: {err}"),
        }
        result
    }

    async fn run_with(
        &self,
        conversation: Conversation,
        lifecycle: &mut BackendLifecycle,
    ) -> Result<RunOutcome, Error> {
        let catalog = CatalogBuilder::new(self.connector.as_ref(), &self.env)
            .build(&self.specs, lifecycle)
            .await?;
        debug!("catalog ready with {} tool(s)", catalog.len());

        Controller::new(self, &catalog, conversation).run().await
    }
}
