use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Bounds applied to a single ICY title lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Wall-clock budget for the whole lookup: connect, redirects and the
    /// first metadata frame.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u8,
    /// Bytes past `icy-metaint` we are willing to read before giving up on
    /// the first metadata block.
    #[serde(default = "default_overflow_bytes")]
    pub overflow_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

/// Where to look for a station allow-list that replaces the built-in one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Defaults to `$CONFIG_DIR/nowplaying/stations.toml`.  A missing file
    /// means the built-in stations are used.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_redirects: default_max_redirects(),
            overflow_bytes: default_overflow_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        // a zero interval would spin tokio::time::interval
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timeout_ms() -> u64 {
    6000
}

fn default_connect_timeout_ms() -> u64 {
    6000
}

fn default_max_redirects() -> u8 {
    3
}

fn default_overflow_bytes() -> usize {
    1024
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config.with_env_overrides());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config.with_env_overrides())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// A valid `PORT` in the environment overrides `http.port`.
    fn with_env_overrides(mut self) -> Self {
        if let Some(port) = std::env::var("PORT")
            .ok()
            .and_then(|p| p.trim().parse::<u16>().ok())
        {
            self.http.port = port;
        }
        self
    }
}
