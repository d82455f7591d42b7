use tracing::Instrument;

use super::Catalog;
use crate::backend::{
    BackendConnector, BackendHandle, BackendLifecycle, BackendSpec, EnvLookup,
};
use crate::error::Error;

/// Connects to configured back-ends and merges their tools into a
/// [`Catalog`].
pub struct CatalogBuilder<'a> {
    connector: &'a dyn BackendConnector,
    env: &'a EnvLookup,
}

impl<'a> CatalogBuilder<'a> {
    /// Creates a builder using `connector` to open connections and `env`
    /// to check preconditions.
    #[inline]
    pub fn new(connector: &'a dyn BackendConnector, env: &'a EnvLookup) -> Self {
        Self { connector, env }
    }

    /// Connects to every usable spec, in order, and registers its tools.
    ///
    /// Specs with an unmet environment precondition are skipped without
    /// connecting. Any other spec must be reachable: the first connection
    /// or listing failure aborts the build. Every opened connection is
    /// tracked by `lifecycle` before it is used, so it gets closed even if
    /// a later step fails.
    pub async fn build(
        &self,
        specs: &[BackendSpec],
        lifecycle: &mut BackendLifecycle,
    ) -> Result<Catalog, Error> {
        let mut catalog = Catalog::default();

        for spec in specs {
            if let Some(var) = spec.missing_requirement(self.env) {
                info!("skipping back-end {}: {var} is not set", spec.id);
                continue;
            }

            let span = debug_span!("back-end startup", backend = %spec.id);
            let handle = self
                .open(spec, lifecycle)
                .instrument(span.clone())
                .await?;
            let tools = handle
                .list_tools()
                .instrument(span)
                .await
                .map_err(|source| Error::Startup {
                    backend: spec.id.clone(),
                    source,
                })?;

            debug!("back-end {} offers {} tool(s)", spec.id, tools.len());
            for tool in tools {
                catalog.register(tool, handle.clone());
            }
        }

        Ok(catalog)
    }

    async fn open(
        &self,
        spec: &BackendSpec,
        lifecycle: &mut BackendLifecycle,
    ) -> Result<BackendHandle, Error> {
        let resolved = spec.resolve(self.env);
        trace!("connecting: {} {:?}", resolved.command, resolved.args);
        let backend = self.connector.connect(&resolved).await.map_err(
            |source| Error::Startup {
                backend: spec.id.clone(),
                source,
            },
        )?;
        let handle = BackendHandle::new(spec.id.as_str(), backend);
        lifecycle.track(handle.clone());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{FakeBackend, FakeConnector};

    #[tokio::test]
    async fn test_merge_with_collision() {
        let github = Arc::new(FakeBackend::new(["search", "create_issue"]));
        let web = Arc::new(FakeBackend::new(["search", "fetch"]));
        let connector = FakeConnector::default()
            .with_backend("github", github.clone())
            .with_backend("web", web.clone());
        let env = EnvLookup::from_pairs::<_, String, String>([]);
        let specs = [
            BackendSpec::new("github", "gh-server"),
            BackendSpec::new("web", "web-server"),
        ];

        let mut lifecycle = BackendLifecycle::default();
        let catalog = CatalogBuilder::new(&connector, &env)
            .build(&specs, &mut lifecycle)
            .await
            .unwrap();

        assert_eq!(
            catalog.names().collect::<Vec<_>>(),
            ["search", "create_issue", "fetch"]
        );
        assert_eq!(catalog.backend("search").unwrap().id(), "web");
        assert_eq!(catalog.backend("create_issue").unwrap().id(), "github");
        assert_eq!(catalog.collisions().len(), 1);
        assert_eq!(catalog.collisions()[0].previous, "github");

        // Both connections are tracked, whichever won the names.
        assert_eq!(lifecycle.len(), 2);
        lifecycle.close_all().await;
        assert_eq!(github.close_count(), 1);
        assert_eq!(web.close_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_unmet_precondition() {
        let github = Arc::new(FakeBackend::new(["search"]));
        let connector =
            FakeConnector::default().with_backend("github", github.clone());
        let env = EnvLookup::from_pairs([("OTHER", "1")]);
        let specs =
            [BackendSpec::new("github", "docker").requiring_env("GITHUB_TOKEN")];

        let mut lifecycle = BackendLifecycle::default();
        let catalog = CatalogBuilder::new(&connector, &env)
            .build(&specs, &mut lifecycle)
            .await
            .unwrap();

        assert!(catalog.is_empty());
        assert!(connector.connected().is_empty());
        assert!(lifecycle.is_empty());
    }

    #[tokio::test]
    async fn test_env_overrides_are_resolved() {
        let github = Arc::new(FakeBackend::new(["search"]));
        let connector =
            FakeConnector::default().with_backend("github", github.clone());
        let env = EnvLookup::from_pairs([("GITHUB_TOKEN", "ghp_x")]);
        let specs = [BackendSpec::new("github", "docker")
            .requiring_env("GITHUB_TOKEN")
            .with_env("GITHUB_PERSONAL_ACCESS_TOKEN", "${GITHUB_TOKEN}")];

        let mut lifecycle = BackendLifecycle::default();
        CatalogBuilder::new(&connector, &env)
            .build(&specs, &mut lifecycle)
            .await
            .unwrap();
        lifecycle.close_all().await;

        let connected = connector.connected();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].env["GITHUB_PERSONAL_ACCESS_TOKEN"], "ghp_x");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fatal() {
        let first = Arc::new(FakeBackend::new(["search"]));
        let connector =
            FakeConnector::default().with_backend("first", first.clone());
        let env = EnvLookup::from_pairs::<_, String, String>([]);
        let specs = [
            BackendSpec::new("first", "first-server"),
            BackendSpec::new("missing", "missing-server"),
        ];

        let mut lifecycle = BackendLifecycle::default();
        let result = CatalogBuilder::new(&connector, &env)
            .build(&specs, &mut lifecycle)
            .await;
        let Err(Error::Startup { backend, .. }) = result else {
            panic!("expected a startup error");
        };
        assert_eq!(backend, "missing");

        // The connection opened before the failure is still released.
        assert_eq!(lifecycle.len(), 1);
        lifecycle.close_all().await;
        assert_eq!(first.close_count(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let broken = Arc::new(FakeBackend::new(["search"]).failing_list());
        let connector =
            FakeConnector::default().with_backend("broken", broken.clone());
        let env = EnvLookup::from_pairs::<_, String, String>([]);
        let specs = [BackendSpec::new("broken", "broken-server")];

        let mut lifecycle = BackendLifecycle::default();
        let result = CatalogBuilder::new(&connector, &env)
            .build(&specs, &mut lifecycle)
            .await;
        assert!(matches!(result, Err(Error::Startup { .. })));

        lifecycle.close_all().await;
        assert_eq!(broken.close_count(), 1);
    }
}
