use std::sync::Arc;
use std::time::Duration;

use toolrelay_model::ModelProvider;

use super::{Agent, DEFAULT_MAX_ROUNDS};
use crate::backend::{BackendConnector, BackendSpec, EnvLookup, NoConnector};
use crate::model_client::ModelClient;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    connector: Arc<dyn BackendConnector>,
    specs: Vec<BackendSpec>,
    env: EnvLookup,
    system_prompt: Option<String>,
    max_rounds: usize,
    call_timeout: Option<Duration>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            connector: Arc::new(NoConnector),
            specs: vec![],
            env: EnvLookup::default(),
            system_prompt: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            call_timeout: None,
        }
    }

    /// Sets the system prompt sent with every completion request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the connector used to open back-end connections.
    #[inline]
    pub fn with_connector<C: BackendConnector + 'static>(
        mut self,
        connector: C,
    ) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Adds a back-end spec. Specs are connected in the order they are
    /// added, later ones win tool name collisions.
    #[inline]
    pub fn with_backend(mut self, spec: BackendSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Adds several back-end specs.
    #[inline]
    pub fn with_backends<I: IntoIterator<Item = BackendSpec>>(
        mut self,
        specs: I,
    ) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Sets where environment preconditions and `${NAME}` references are
    /// looked up. Defaults to the process environment.
    #[inline]
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Sets the maximum number of tool rounds per run.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets a deadline applied to each completion call and each tool call.
    ///
    /// There is no deadline by default.
    #[inline]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            connector,
            specs,
            env,
            system_prompt,
            max_rounds,
            call_timeout,
        } = self;

        Agent {
            model_client,
            connector,
            specs: specs.into(),
            env,
            system_prompt,
            max_rounds,
            call_timeout,
        }
    }
}
