use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "hci_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub poll_interval_ms: u64,
    pub event_buffer: usize,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            poll_interval_ms: 500,
            event_buffer: 1024,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_url: Option<String>,
    poll_interval_ms: Option<u64>,
    event_buffer: Option<usize>,
    request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash, validated as http(s).
    pub fn base_url(&self) -> Result<String> {
        let parsed = Url::parse(self.server_url.trim())
            .with_context(|| format!("invalid server_url '{}'", self.server_url))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "server_url must start with http:// or https:// (got {other}://)"
                ))
            }
        }
        Ok(parsed.as_str().trim_end_matches('/').to_string())
    }

    pub fn websocket_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.base_url()?)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot derive websocket url from {}", self.server_url))?;
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url.to_string())
    }

    fn apply_file(&mut self, raw: &str) -> Result<()> {
        let file_cfg: FileConfig = toml::from_str(raw).context("malformed client config file")?;
        if let Some(v) = file_cfg.server_url {
            self.server_url = v;
        }
        if let Some(v) = file_cfg.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = file_cfg.event_buffer {
            self.event_buffer = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HCI_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("HCI_POLL_INTERVAL_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.poll_interval_ms = parsed;
            }
        }
        if let Some(v) = lookup("HCI_REQUEST_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_secs = parsed;
            }
        }
    }
}

/// Defaults, then the optional config file, then environment overrides.
pub fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    match fs::read_to_string(path) {
        Ok(raw) => config
            .apply_file(&raw)
            .with_context(|| format!("failed to load '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }

    config.apply_env(|key| std::env::var(key).ok());
    config.base_url()?;
    Ok(config)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
