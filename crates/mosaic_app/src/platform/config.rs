use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mosaic_engine::{ClientSettings, PollSettings};
use serde::Deserialize;

pub(crate) const CONFIG_FILENAME: &str = "mosaic.ron";

/// Front-end settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub network_retry_budget: u32,
    pub request_timeout_secs: u64,
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: ClientSettings::DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 1000,
            network_retry_budget: 0,
            request_timeout_secs: 120,
            log_to_file: false,
        }
    }
}

impl AppConfig {
    pub(crate) fn client_settings(&self) -> anyhow::Result<ClientSettings> {
        let mut settings = ClientSettings::parse(&self.base_url)
            .with_context(|| format!("invalid base url {:?}", self.base_url))?;
        settings.request_timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(settings)
    }

    pub(crate) fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            network_retry_budget: self.network_retry_budget,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Reads the config file. A missing file is not an error.
pub(crate) fn read_config(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    ron::from_str(&content)
        .map(Some)
        .map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// Like [`read_config`], but falls back to defaults. The error is handed back
/// so it can be reported once logging is initialized.
pub(crate) fn load_config(path: &Path) -> (AppConfig, Option<ConfigError>) {
    match read_config(path) {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}
