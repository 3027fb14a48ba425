//! Installer configuration.
//!
//! One TOML profile describes a target server, the folder holding module
//! archives, and the confirm-step knobs. An optional `[[module]]` table
//! replaces the built-in dependency graph; its declaration order is the
//! graph's install order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GraphError;
use crate::graph::{DependencyGraph, GraphEntry};

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "gantry.toml";

const DEFAULT_MODULES_DIR: &str = "modules";
const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// One loaded installer profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GantryConfig {
    /// Base URL of the module server.
    pub server_url: Url,

    /// Login name; prompted for when absent.
    #[serde(default)]
    pub username: Option<String>,

    /// Password; prompted for when absent, which keeps it out of the file.
    #[serde(default)]
    pub password: Option<String>,

    /// Folder scanned for module archives.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Whether to poll the installed list after each install call.
    #[serde(default = "default_confirm_install")]
    pub confirm_install: bool,

    /// Ceiling on one module's confirm polling, in seconds.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Sleep between installed-list polls, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Dependency table override; empty means the built-in table.
    #[serde(default, rename = "module")]
    pub modules: Vec<GraphEntry>,
}

impl GantryConfig {
    /// A profile with defaults for everything except the server address.
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            username: None,
            password: None,
            modules_dir: PathBuf::from(DEFAULT_MODULES_DIR),
            confirm_install: default_confirm_install(),
            confirm_timeout_secs: DEFAULT_CONFIRM_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            modules: Vec::new(),
        }
    }

    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Locate and load a profile.
    ///
    /// An explicit path must exist. Otherwise `gantry.toml` is tried in the
    /// working directory, then in the user config directory; `Ok(None)`
    /// means no file was found anywhere.
    pub fn find(explicit: Option<&Path>) -> Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load(&local).map(Some);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let global = config_dir.join("gantry").join(CONFIG_FILE_NAME);
            if global.is_file() {
                return Self::load(&global).map(Some);
            }
        }

        Ok(None)
    }

    /// The dependency graph this profile selects: the `[[module]]` override
    /// when present, the built-in table otherwise.
    pub fn graph(&self) -> Result<DependencyGraph, GraphError> {
        if self.modules.is_empty() {
            Ok(DependencyGraph::builtin())
        } else {
            DependencyGraph::from_entries(self.modules.clone())
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MODULES_DIR)
}

fn default_confirm_install() -> bool {
    true
}

fn default_confirm_timeout_secs() -> u64 {
    DEFAULT_CONFIRM_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_profile_uses_defaults() {
        let config: GantryConfig =
            toml::from_str(r#"server_url = "http://localhost:8080""#).unwrap();

        assert_eq!(config.server_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.modules_dir, PathBuf::from("modules"));
        assert!(config.confirm_install);
        assert_eq!(config.confirm_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.username.is_none());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_full_profile_round_trip() {
        let raw = r#"
            server_url = "https://lamis.example.org:8443"
            username = "admin"
            modules_dir = "/srv/modules"
            confirm_install = false
            confirm_timeout_secs = 90
            poll_interval_secs = 5

            [[module]]
            name = "Patient"

            [[module]]
            name = "Triage"
            requires = ["Patient"]
        "#;
        let config: GantryConfig = toml::from_str(raw).unwrap();

        assert_eq!(config.username.as_deref(), Some("admin"));
        assert!(!config.confirm_install);
        assert_eq!(config.confirm_timeout(), Duration::from_secs(90));
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[1].requires, vec!["Patient"]);
    }

    #[test]
    fn test_graph_override_preserves_declaration_order() {
        let raw = r#"
            server_url = "http://localhost:8080"

            [[module]]
            name = "Zulu"

            [[module]]
            name = "Alpha"
            requires = ["Zulu"]
        "#;
        let config: GantryConfig = toml::from_str(raw).unwrap();
        let graph = config.graph().unwrap();

        let names: Vec<&str> = graph.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zulu", "Alpha"]);
    }

    #[test]
    fn test_empty_override_falls_back_to_builtin() {
        let config: GantryConfig =
            toml::from_str(r#"server_url = "http://localhost:8080""#).unwrap();
        assert_eq!(config.graph().unwrap().len(), DependencyGraph::builtin().len());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let raw = r#"
            server_url = "http://localhost:8080"

            [[module]]
            name = "A"
            requires = ["B"]

            [[module]]
            name = "B"
            requires = ["A"]
        "#;
        let config: GantryConfig = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.graph(),
            Err(GraphError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = GantryConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_load_reports_parse_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "server_url = ").unwrap();

        let err = GantryConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn test_explicit_path_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, r#"server_url = "http://localhost:8080""#).unwrap();

        let config = GantryConfig::find(Some(&path)).unwrap();
        assert!(config.is_some());
    }
}
