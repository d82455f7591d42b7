use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use toolrelay_core::{BackendConnector, BackendError, BackendSpec, ToolBackend};

use crate::backend::StdioBackend;
use crate::transport::Transport;

/// The default time a back-end gets to complete the handshake.
const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches back-end processes and connects to them over their stdio.
///
/// The process gets the spec's arguments and environment overrides on top
/// of the current environment. Its stderr is inherited so that its logs
/// end up next to ours.
#[derive(Clone, Debug)]
pub struct StdioConnector {
    init_timeout: Duration,
}

impl StdioConnector {
    /// Creates a connector with the default handshake timeout.
    #[inline]
    pub fn new() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    /// Sets how long a back-end gets to complete the handshake.
    #[inline]
    pub fn with_init_timeout(mut self, init_timeout: Duration) -> Self {
        self.init_timeout = init_timeout;
        self
    }
}

impl Default for StdioConnector {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendConnector for StdioConnector {
    async fn connect(
        &self,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                BackendError::with_source(
                    format!("failed to launch `{}`", spec.command),
                    err,
                )
            })?;
        debug!("launched back-end {} (pid {:?})", spec.id, child.id());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take())
        else {
            return Err(BackendError::new("failed to capture the back-end stdio"));
        };
        let transport = Transport::new(spec.id.as_str(), stdin, stdout);
        let backend = StdioBackend::new(spec.id.as_str(), transport, Some(child));

        match tokio::time::timeout(self.init_timeout, backend.initialize()).await {
            Ok(Ok(())) => Ok(Arc::new(backend)),
            Ok(Err(err)) => {
                // Dropping the backend kills the process.
                Err(BackendError::with_source("handshake failed", err))
            }
            Err(_) => Err(BackendError::new(format!(
                "handshake did not complete within {:?}",
                self.init_timeout
            ))),
        }
    }
}
