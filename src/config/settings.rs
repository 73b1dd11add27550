use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL for one-way streaming calls (logs, deploy actions)
    pub server_url: String,
    /// Base URL for duplex exec sockets
    pub socket_url: String,
    /// Maximum number of session tabs allowed
    pub max_sessions: usize,
    /// Text of the marker written when a socket closes
    pub closed_marker: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            socket_url: "ws://127.0.0.1:5000".to_string(),
            max_sessions: 20,
            closed_marker: "connection closed".to_string(),
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub server_url: Option<String>,
    pub socket_url: Option<String>,
    pub max_sessions: Option<usize>,
    pub closed_marker: Option<String>,
}

impl Config {
    /// Load configuration from the default config path, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific file, merging with defaults.
    ///
    /// A missing or unparsable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "No config file, using defaults"
                );
                return config;
            }
        };

        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => config.merge(toml_config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                config
            }
        }
    }

    fn merge(mut self, toml_config: TomlConfig) -> Self {
        if let Some(server_url) = toml_config.server_url {
            self.server_url = server_url;
        }
        if let Some(socket_url) = toml_config.socket_url {
            self.socket_url = socket_url;
        }
        if let Some(max_sessions) = toml_config.max_sessions {
            // zero would make every open fail
            self.max_sessions = max_sessions.max(1);
        }
        if let Some(closed_marker) = toml_config.closed_marker {
            self.closed_marker = closed_marker;
        }
        self
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }
}
