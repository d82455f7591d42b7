//! Tool back-ends and the connections opened to them.
//!
//! The loop never talks to a back-end directly. A [`BackendConnector`] turns
//! a [`BackendSpec`] into a live [`ToolBackend`], which is wrapped in a
//! [`BackendHandle`] and tracked by a [`BackendLifecycle`] until the run
//! ends.

mod lifecycle;
mod spec;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::tool::{Arguments, ToolDescriptor, ToolResult};
pub use lifecycle::BackendLifecycle;
pub use spec::{BackendSpec, BackendsConfig, ConfigError, EnvLookup};

/// An error raised while connecting to, listing or closing a back-end.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl BackendError {
    /// Creates an error with a message only.
    #[inline]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error caused by another error.
    #[inline]
    pub fn with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An open connection to one tool back-end.
///
/// Implementations must tolerate `close` being the last call they receive;
/// they are never reopened.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Lists the tools this back-end exposes, in its own order.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError>;

    /// Calls a tool.
    ///
    /// Any failure, including a broken transport, should be reported as a
    /// [`ToolCallError`] so the model gets a chance to react to it.
    ///
    /// [`ToolCallError`]: crate::tool::ToolCallError
    async fn call_tool(&self, name: &str, arguments: Arguments) -> ToolResult;

    /// Closes the connection.
    async fn close(&self) -> Result<(), BackendError>;
}

/// Opens connections to back-ends described by [`BackendSpec`]s.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Opens a connection.
    ///
    /// `spec` has its environment overrides already expanded.
    async fn connect(
        &self,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolBackend>, BackendError>;
}

#[async_trait]
impl<T: BackendConnector + ?Sized> BackendConnector for Arc<T> {
    #[inline]
    async fn connect(
        &self,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        (**self).connect(spec).await
    }
}

/// A connector that can't connect to anything.
///
/// Used when an agent is built without a connector; any configured spec
/// then fails at startup.
pub(crate) struct NoConnector;

#[async_trait]
impl BackendConnector for NoConnector {
    async fn connect(
        &self,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        Err(BackendError::new(format!(
            "no connector is configured for back-end `{}`",
            spec.id
        )))
    }
}

/// A shared reference to an open back-end connection.
///
/// The handle is cheap to clone. The catalog keeps clones to route calls,
/// while closing is reserved to [`BackendLifecycle`].
#[derive(Clone)]
pub struct BackendHandle {
    id: Arc<str>,
    backend: Arc<dyn ToolBackend>,
}

impl BackendHandle {
    /// Wraps an open connection.
    #[inline]
    pub fn new<S: Into<Arc<str>>>(id: S, backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            id: id.into(),
            backend,
        }
    }

    /// Returns the identifier of the spec this connection was opened from.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns whether both handles point to the same connection.
    #[inline]
    pub fn same_connection(&self, other: &BackendHandle) -> bool {
        Arc::as_ptr(&self.backend).cast::<()>()
            == Arc::as_ptr(&other.backend).cast::<()>()
    }

    #[inline]
    pub(crate) async fn list_tools(
        &self,
    ) -> Result<Vec<ToolDescriptor>, BackendError> {
        self.backend.list_tools().await
    }

    #[inline]
    pub(crate) async fn call_tool(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> ToolResult {
        self.backend.call_tool(name, arguments).await
    }

    #[inline]
    async fn close(&self) -> Result<(), BackendError> {
        self.backend.close().await
    }
}

impl Debug for BackendHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
