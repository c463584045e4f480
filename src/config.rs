use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::gateway::Principal;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub gateway: GatewayConfig,
  /// Caller identity; reactions and profile saves are tied to it
  pub principal: Option<Principal>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
  pub url: String,
}

impl GatewayConfig {
  /// Parse the configured URL as a base that relative endpoints can be joined onto.
  pub fn base_url(&self) -> Result<Url> {
    let mut raw = self.url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }

    let url = Url::parse(&raw).map_err(|e| eyre!("Invalid gateway url '{}': {}", self.url, e))?;
    match url.scheme() {
      "http" | "https" => Ok(url),
      other => Err(eyre!("Unsupported gateway url scheme: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Age after which a fresh entry is refetched on its next read.
  /// Unset means entries stay fresh until a write invalidates them.
  pub stale_after_secs: Option<u64>,
  /// How long an unobserved entry is kept before it is dropped
  #[serde(default = "default_gc_after_secs")]
  pub gc_after_secs: u64,
}

fn default_gc_after_secs() -> u64 {
  300
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after_secs: None,
      gc_after_secs: default_gc_after_secs(),
    }
  }
}

fn seconds(secs: u64) -> Option<chrono::Duration> {
  i64::try_from(secs)
    .ok()
    .and_then(chrono::Duration::try_seconds)
}

impl CacheConfig {
  /// Reject durations too large to represent.
  fn validate(&self) -> Result<()> {
    if let Some(secs) = self.stale_after_secs {
      seconds(secs).ok_or_else(|| eyre!("cache.stale_after_secs is out of range: {}", secs))?;
    }
    seconds(self.gc_after_secs)
      .ok_or_else(|| eyre!("cache.gc_after_secs is out of range: {}", self.gc_after_secs))?;
    Ok(())
  }

  pub fn stale_after(&self) -> Option<chrono::Duration> {
    self
      .stale_after_secs
      .map(|secs| seconds(secs).unwrap_or(chrono::Duration::MAX))
  }

  pub fn gc_after(&self) -> chrono::Duration {
    seconds(self.gc_after_secs).unwrap_or(chrono::Duration::MAX)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./threadline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/threadline/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/threadline/config.yaml \
         with at least `gateway: {{ url: ... }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("threadline.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("threadline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.gateway.base_url()?;
    config.cache.validate()?;
    Ok(config)
  }

  /// Bearer token for the content service, read from THREADLINE_TOKEN.
  ///
  /// Absent means the client talks to the service anonymously.
  pub fn api_token() -> Option<String> {
    std::env::var("THREADLINE_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
