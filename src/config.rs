use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable overriding `api.url`, read by the `--url` flag
pub const URL_ENV: &str = "T9S_API_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub query: QueryConfig,
  /// Initial page size of the task list
  pub page_size: u64,
  /// Owner id pre-filled in the add-task form
  pub default_owner: u64,
  /// Custom title for header (defaults to the service host if not set)
  pub title: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      query: QueryConfig::default(),
      page_size: 30,
      default_owner: 1,
      title: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8080".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
  /// How long a fetched entry stays fresh
  pub stale_time_secs: u64,
  /// Automatic retries for failed reads
  pub retry: u32,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: 300,
      retry: 1,
    }
  }
}

impl QueryConfig {
  pub fn stale_time(&self) -> chrono::Duration {
    let secs = self.stale_time_secs.min(u32::MAX as u64);
    chrono::Duration::seconds(secs as i64)
  }
}

impl Config {
  /// Load configuration from file, falling back to defaults when no file
  /// exists.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./t9s.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/t9s/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("t9s.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("t9s").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Reject settings the app cannot start with.
  pub fn validate(&self) -> Result<()> {
    if self.page_size == 0 {
      return Err(eyre!("page_size must be at least 1"));
    }

    let url = Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid api.url {:?}: {}", self.api.url, e))?;
    match url.scheme() {
      "http" | "https" => Ok(()),
      other => Err(eyre!(
        "Invalid api.url {:?}: unsupported scheme {}",
        self.api.url,
        other
      )),
    }
  }

  /// Host shown in the header
  pub fn host(&self) -> String {
    Url::parse(&self.api.url)
      .ok()
      .and_then(|u| {
        u.host_str().map(|h| match u.port() {
          Some(port) => format!("{}:{}", h, port),
          None => h.to_string(),
        })
      })
      .unwrap_or_else(|| self.api.url.clone())
  }

  pub fn header_title(&self) -> String {
    self.title.clone().unwrap_or_else(|| "t9s".to_string())
  }
}
