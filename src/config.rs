use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "https://backend-vkuq.onrender.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the REST API
  pub api_url: String,
  /// Base URL of the Socket.IO endpoint (usually the same host as the API)
  pub socket_url: String,
  /// Per-request timeout for REST calls, in seconds
  pub request_timeout_secs: u64,
  pub sync: SyncConfig,
  pub socket: SocketConfig,
  /// Rows per page in list output
  pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// How often the engine checks for stale collections, in seconds
  pub poll_interval_secs: u64,
  /// Age after which a loaded collection is fetched again, in seconds
  pub stale_time_secs: u64,
  /// Stale time for paginated per-machine queries, in seconds
  pub page_cache_secs: u64,
  /// Keep a SQLite snapshot of fetched data for offline use
  pub offline_cache: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
  pub reconnection: bool,
  /// Consecutive failed attempts before giving up; unset retries forever
  pub reconnection_attempts: Option<u32>,
  pub reconnection_delay_ms: u64,
  pub reconnection_delay_max_ms: u64,
  pub connect_timeout_ms: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: DEFAULT_BACKEND_URL.to_string(),
      socket_url: DEFAULT_BACKEND_URL.to_string(),
      request_timeout_secs: 30,
      sync: SyncConfig::default(),
      socket: SocketConfig::default(),
      page_size: 10,
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: 30,
      stale_time_secs: 5 * 60,
      page_cache_secs: 2 * 60,
      offline_cache: true,
    }
  }
}

impl Default for SocketConfig {
  fn default() -> Self {
    Self {
      reconnection: true,
      reconnection_attempts: None,
      reconnection_delay_ms: 1000,
      reconnection_delay_max_ms: 5000,
      connect_timeout_ms: 20_000,
    }
  }
}

impl SyncConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs.max(1))
  }

  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_time_secs)
  }

  pub fn page_cache_time(&self) -> Duration {
    Duration::from_secs(self.page_cache_secs)
  }
}

impl SocketConfig {
  pub fn reconnection_delay(&self) -> Duration {
    Duration::from_millis(self.reconnection_delay_ms)
  }

  pub fn reconnection_delay_max(&self) -> Duration {
    Duration::from_millis(self.reconnection_delay_max_ms.max(self.reconnection_delay_ms))
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./recortes.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/recortes/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Config::default()
      }
    };

    Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("recortes.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("recortes").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub(crate) fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file deserializes to unit, not to a map
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  /// Apply `RECORTES_API_URL` / `RECORTES_SOCKET_URL` overrides.
  ///
  /// When only the API URL is overridden the socket follows it, unless the
  /// socket URL was also set explicitly.
  pub(crate) fn with_env_overrides<F>(mut self, lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let api = lookup("RECORTES_API_URL").filter(|v| !v.trim().is_empty());
    let socket = lookup("RECORTES_SOCKET_URL").filter(|v| !v.trim().is_empty());

    if let Some(api) = api {
      if socket.is_none() && self.socket_url == self.api_url {
        self.socket_url = api.clone();
      }
      self.api_url = api;
    }
    if let Some(socket) = socket {
      self.socket_url = socket;
    }
    self
  }

  /// Apply command-line overrides on top of file and environment values.
  pub fn with_overrides(mut self, api_url: Option<String>, socket_url: Option<String>) -> Self {
    if let Some(api) = api_url {
      if socket_url.is_none() && self.socket_url == self.api_url {
        self.socket_url = api.clone();
      }
      self.api_url = api;
    }
    if let Some(socket) = socket_url {
      self.socket_url = socket;
    }
    self
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }
}

/// Directory for the offline cache and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("recortes"))
}
