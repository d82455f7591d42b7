use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// How to reach one tool back-end.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Identifier of the back-end, used in logs and errors.
    #[serde(skip)]
    pub id: String,
    /// The program to launch.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides for the program.
    ///
    /// Values may reference process variables as `${NAME}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Variables that must be set and non-empty for this back-end to be
    /// used at all.
    #[serde(default)]
    pub requires_env: Vec<String>,
}

impl BackendSpec {
    /// Creates a spec launching `command`.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(id: S1, command: S2) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Appends arguments.
    #[inline]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment override.
    #[inline]
    pub fn with_env<S1: Into<String>, S2: Into<String>>(
        mut self,
        key: S1,
        value: S2,
    ) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Declares a variable that must be present for this spec to be used.
    #[inline]
    pub fn requiring_env<S: Into<String>>(mut self, name: S) -> Self {
        self.requires_env.push(name.into());
        self
    }

    /// Returns the first required variable that is missing or empty.
    pub fn missing_requirement(&self, env: &EnvLookup) -> Option<&str> {
        self.requires_env
            .iter()
            .find(|name| env.get(name).is_none_or(|value| value.is_empty()))
            .map(String::as_str)
    }

    /// Returns a copy with `${NAME}` references in the environment
    /// overrides expanded. Unset variables expand to an empty string.
    pub fn resolve(&self, env: &EnvLookup) -> BackendSpec {
        let resolved = self
            .env
            .iter()
            .map(|(key, value)| (key.clone(), interpolate(value, env)))
            .collect();
        BackendSpec {
            env: resolved,
            ..self.clone()
        }
    }
}

fn interpolate(value: &str, env: &EnvLookup) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&env.get(name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Looks up environment variables.
///
/// Defaults to the process environment. Tests and embedders can supply
/// their own table instead.
#[derive(Clone)]
pub struct EnvLookup(Arc<dyn Fn(&str) -> Option<String> + Send + Sync>);

impl EnvLookup {
    /// Reads from the process environment.
    #[inline]
    pub fn process() -> Self {
        Self(Arc::new(|name| std::env::var(name).ok()))
    }

    /// Reads from a fixed table.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Arc::new(move |name| table.get(name).cloned()))
    }

    /// Returns the value of a variable.
    #[inline]
    pub fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }
}

impl Default for EnvLookup {
    #[inline]
    fn default() -> Self {
        Self::process()
    }
}

impl Debug for EnvLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EnvLookup").finish_non_exhaustive()
    }
}

/// An error raised while loading back-end configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The content is not a valid configuration.
    #[error("invalid back-end configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A list of back-end specs, in configuration order.
///
/// The file layout is the common `mcpServers` one:
///
/// ```json
/// {
///   "mcpServers": {
///     "github": {
///       "command": "docker",
///       "args": ["run", "-i", "--rm", "-e", "GITHUB_PERSONAL_ACCESS_TOKEN", "mcp/github"],
///       "env": { "GITHUB_PERSONAL_ACCESS_TOKEN": "${GITHUB_TOKEN}" },
///       "requiresEnv": ["GITHUB_TOKEN"]
///     }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendsConfig {
    /// The specs, in the order they appear in the file.
    pub backends: Vec<BackendSpec>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "mcpServers", default)]
    servers: Map<String, Value>,
}

impl BackendsConfig {
    /// Parses a configuration document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(s)?;
        let backends = raw
            .servers
            .into_iter()
            .map(|(id, value)| -> Result<BackendSpec, serde_json::Error> {
                let spec: BackendSpec = serde_json::from_value(value)?;
                Ok(BackendSpec { id, ..spec })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { backends })
    }

    /// Reads and parses a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_keeps_order() {
        let config = BackendsConfig::from_json_str(
            r#"{
                "mcpServers": {
                    "zeta": { "command": "zeta-server" },
                    "alpha": {
                        "command": "docker",
                        "args": ["run", "-i", "mcp/github"],
                        "env": { "TOKEN": "${GITHUB_TOKEN}" },
                        "requiresEnv": ["GITHUB_TOKEN"]
                    }
                }
            }"#,
        )
        .unwrap();

        let ids: Vec<_> = config.backends.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha"]);

        let alpha = &config.backends[1];
        assert_eq!(alpha.command, "docker");
        assert_eq!(alpha.args, ["run", "-i", "mcp/github"]);
        assert_eq!(alpha.requires_env, ["GITHUB_TOKEN"]);
        assert!(config.backends[0].args.is_empty());
    }

    #[test]
    fn test_parse_config_errors() {
        let err = BackendsConfig::from_json_str(
            r#"{ "mcpServers": { "broken": { "args": [] } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = BackendsConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_missing_requirement() {
        let spec = BackendSpec::new("github", "docker").requiring_env("GITHUB_TOKEN");

        let env = EnvLookup::from_pairs([("OTHER", "1")]);
        assert_eq!(spec.missing_requirement(&env), Some("GITHUB_TOKEN"));

        let env = EnvLookup::from_pairs([("GITHUB_TOKEN", "")]);
        assert_eq!(spec.missing_requirement(&env), Some("GITHUB_TOKEN"));

        let env = EnvLookup::from_pairs([("GITHUB_TOKEN", "ghp_x")]);
        assert_eq!(spec.missing_requirement(&env), None);
    }

    #[test]
    fn test_resolve_env() {
        let spec = BackendSpec::new("github", "docker")
            .with_env("GITHUB_PERSONAL_ACCESS_TOKEN", "${GITHUB_TOKEN}")
            .with_env("MIXED", "a-${A}-${UNSET}-b")
            .with_env("BROKEN", "${NOPE");
        let env = EnvLookup::from_pairs([("GITHUB_TOKEN", "ghp_x"), ("A", "1")]);

        let resolved = spec.resolve(&env);
        assert_eq!(resolved.env["GITHUB_PERSONAL_ACCESS_TOKEN"], "ghp_x");
        assert_eq!(resolved.env["MIXED"], "a-1--b");
        assert_eq!(resolved.env["BROKEN"], "${NOPE");
        assert_eq!(resolved.id, "github");
    }
}
