//! `storyreel.ron` loading.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reel_logging::reel_info;
use serde::Deserialize;
use storyreel_engine::ClientSettings;

pub const DEFAULT_CONFIG_FILE: &str = "storyreel.ron";
pub const BASE_URL_ENV: &str = "STORYREEL_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ClientSettings::default();
        Self {
            base_url: settings.base_url,
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            request_timeout_secs: settings.request_timeout.as_secs(),
        }
    }
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogDestination {
    /// Write to ./storyreel.log in the current directory.
    File,
    /// Write to stderr, keeping stdout for command output.
    #[default]
    Terminal,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: Option<String>,
    pub destination: LogDestination,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub project: String,
    pub chapter: String,
    pub workflow: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            chapter: "chapter1".to_string(),
            workflow: None,
        }
    }
}

impl AppConfig {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.server.base_url.clone(),
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
        }
    }

    fn with_base_url_override(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
            self.server.base_url = url;
        }
        self
    }
}

/// Loads the config file and applies environment overrides.
///
/// A missing `storyreel.ron` in the working directory yields defaults; an
/// explicitly named file must exist.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let config = match explicit {
        Some(path) => read_file(path)?,
        None => match read_file(Path::new(DEFAULT_CONFIG_FILE)) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                AppConfig::default()
            }
            other => other?,
        },
    };
    Ok(config.with_base_url_override(std::env::var(BASE_URL_ENV).ok()))
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    reel_info!("Loaded config from {:?}", path);
    Ok(config)
}
