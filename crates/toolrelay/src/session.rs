use std::time::Duration;

use toolrelay_core::{
    Agent, AgentBuilder, BackendSpec, BackendsConfig, Conversation, EnvLookup,
    Error, HistoryMessage, RunOutcome,
};
use toolrelay_model::ModelProvider;
use toolrelay_stdio_backend::StdioConnector;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    connector: StdioConnector,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            connector: StdioConnector::default(),
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Adds every back-end of a configuration file.
    #[inline]
    pub fn with_backends_config(mut self, config: BackendsConfig) -> Self {
        self.agent_builder = self.agent_builder.with_backends(config.backends);
        self
    }

    /// Adds a single back-end.
    #[inline]
    pub fn with_backend(mut self, spec: BackendSpec) -> Self {
        self.agent_builder = self.agent_builder.with_backend(spec);
        self
    }

    /// Sets where back-end preconditions are checked.
    #[inline]
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.agent_builder = self.agent_builder.with_env(env);
        self
    }

    /// Sets the maximum number of tool rounds per answer.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_rounds(max_rounds);
        self
    }

    /// Sets a deadline for each completion and tool call.
    #[inline]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.agent_builder = self.agent_builder.with_call_timeout(timeout);
        self
    }

    /// Sets how long a back-end process gets to complete its handshake.
    #[inline]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.connector = self.connector.with_init_timeout(timeout);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let agent = self.agent_builder.with_connector(self.connector).build();
        Session { agent }
    }
}

/// A chat session that answers messages with the help of tools.
///
/// Every answer launches its own back-end processes and stops them before
/// returning, so a session can serve several conversations at once. It is
/// basically a wrapper around [`Agent`].
#[derive(Clone)]
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Continues a conversation until the model answers.
    #[inline]
    pub async fn run(
        &self,
        conversation: Conversation,
    ) -> Result<RunOutcome, Error> {
        self.agent.run(conversation).await
    }

    /// Answers a single message.
    #[inline]
    pub async fn send_message(&self, message: &str) -> Result<RunOutcome, Error> {
        self.agent.run(Conversation::from_prompt(message)).await
    }

    /// Answers the latest state of a chat history, where messages written
    /// by `self_id` are the session's own earlier replies.
    pub async fn reply_to_history<I>(
        &self,
        history: I,
        self_id: &str,
    ) -> Result<RunOutcome, Error>
    where
        I: IntoIterator<Item = HistoryMessage>,
    {
        let conversation = Conversation::from_history(history, self_id);
        debug!("replying to a history of {} message(s)", conversation.len());
        self.agent.run(conversation).await
    }
}
