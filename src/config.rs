//! # API Configuration
//!
//! [`ApiConfig`] describes the document-level settings of an [`crate::registry::Api`]:
//! title and version, where the spec document is served, the `servers` block and the
//! security schemes operations may reference.
//!
//! ```yaml
//! title: Cat API
//! version: v1
//! spec_path: /spec
//! servers:
//!   - url: http://feline.io
//! default_security_scheme: jwt_access_token
//! security_schemes:
//!   api_key:
//!     type: apiKey
//!     name: X-API-Key
//!     in: header
//! ```
//!
//! Environment variables override file values:
//!
//! - `CRUDR_API_TITLE`
//! - `CRUDR_API_VERSION`
//! - `CRUDR_SPEC_PATH`
//! - `CRUDR_SERVER_URL` (replaces the servers block with a single entry)

use crate::spec::{SecurityScheme, Server};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_spec_path() -> String {
    "/spec".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub title: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Path the spec document is served on
    #[serde(default = "default_spec_path")]
    pub spec_path: String,
    #[serde(default)]
    pub servers: Vec<Server>,
    /// Scheme for operations that do not name one
    #[serde(default)]
    pub default_security_scheme: Option<String>,
    /// Declared in addition to the built-in `basic_http`, `jwt_access_token` and
    /// `jwt_refresh_token`
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

impl ApiConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: default_version(),
            spec_path: default_spec_path(),
            servers: Vec::new(),
            default_security_scheme: None,
            security_schemes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn spec_path(mut self, path: impl Into<String>) -> Self {
        self.spec_path = path.into();
        self
    }

    #[must_use]
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.servers.push(Server {
            url: url.into(),
            description: None,
        });
        self
    }

    #[must_use]
    pub fn default_security_scheme(mut self, name: impl Into<String>) -> Self {
        self.default_security_scheme = Some(name.into());
        self
    }

    #[must_use]
    pub fn security_scheme(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.security_schemes.insert(name.into(), scheme);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(ConfigError::Parse)
    }

    /// Read a YAML config file. Environment overrides are not applied here; see
    /// [`ApiConfig::with_env_overrides`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if it is not
    /// a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `CRUDR_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(title) = lookup("CRUDR_API_TITLE") {
            self.title = title;
        }
        if let Some(version) = lookup("CRUDR_API_VERSION") {
            self.version = version;
        }
        if let Some(path) = lookup("CRUDR_SPEC_PATH") {
            self.spec_path = path;
        }
        if let Some(url) = lookup("CRUDR_SERVER_URL") {
            self.servers = vec![Server {
                url,
                description: None,
            }];
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
title: Cat API
servers:
  - url: http://feline.io
    description: production
default_security_scheme: jwt_access_token
security_schemes:
  api_key:
    type: apiKey
    name: X-API-Key
    in: header
"#;

    #[test]
    fn test_yaml_defaults() {
        let cfg = ApiConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(cfg.title, "Cat API");
        assert_eq!(cfg.version, "v1");
        assert_eq!(cfg.spec_path, "/spec");
        assert_eq!(cfg.servers[0].description.as_deref(), Some("production"));
        assert_eq!(cfg.default_security_scheme.as_deref(), Some("jwt_access_token"));
        assert!(matches!(
            cfg.security_schemes.get("api_key"),
            Some(SecurityScheme::ApiKey { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let cfg = ApiConfig::load(file.path()).unwrap();
        assert_eq!(cfg.servers.len(), 1);
        assert!(matches!(
            ApiConfig::load("/definitely/not/here.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            ApiConfig::from_yaml_str("title: x\nspec_pth: /docs\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let cfg = ApiConfig::new("Cat API").with_overrides(|key| match key {
            "CRUDR_SPEC_PATH" => Some("/openapi.json".to_string()),
            "CRUDR_SERVER_URL" => Some("https://cats.example".to_string()),
            _ => None,
        });
        assert_eq!(cfg.spec_path, "/openapi.json");
        assert_eq!(cfg.servers[0].url, "https://cats.example");
        assert_eq!(cfg.title, "Cat API");
    }
}
