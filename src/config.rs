use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Remote function endpoint URL.
  pub url: String,
  /// Per-attempt timeout for reads.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Timeout for commands; commands are never retried.
  #[serde(default = "default_command_timeout_ms")]
  pub command_timeout_ms: u64,
  /// Additional read attempts after the first.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base delay for exponential backoff between attempts.
  #[serde(default = "default_backoff_base_ms")]
  pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Startup sweep bound; entries older than this are evicted regardless
  /// of their originating TTL.
  #[serde(default = "default_max_age_ms")]
  pub max_age_ms: u64,
  /// Override for the cache database path.
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_age_ms: default_max_age_ms(),
      path: None,
    }
  }
}

fn default_timeout_ms() -> u64 {
  12_000
}

fn default_command_timeout_ms() -> u64 {
  15_000
}

fn default_max_retries() -> u32 {
  2
}

fn default_backoff_base_ms() -> u64 {
  500
}

fn default_max_age_ms() -> u64 {
  15 * 60 * 1000
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn command_timeout(&self) -> Duration {
    Duration::from_millis(self.command_timeout_ms)
  }

  pub fn backoff_base(&self) -> Duration {
    Duration::from_millis(self.backoff_base_ms)
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> Duration {
    Duration::from_millis(self.max_age_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stockctl.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stockctl/config.yaml
  ///
  /// `STOCKCTL_API_URL` overrides the endpoint URL; with it set, a missing
  /// config file is acceptable and defaults apply.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => match std::env::var("STOCKCTL_API_URL") {
        Ok(url) => Self::from_url(url),
        Err(_) => {
          return Err(eyre!(
            "No configuration file found. Create one at ~/.config/stockctl/config.yaml\n\
                     or set STOCKCTL_API_URL."
          ))
        }
      },
    };

    if let Ok(url) = std::env::var("STOCKCTL_API_URL") {
      config.api.url = url;
    }

    Ok(config)
  }

  fn from_url(url: String) -> Self {
    Self {
      api: ApiConfig {
        url,
        timeout_ms: default_timeout_ms(),
        command_timeout_ms: default_command_timeout_ms(),
        max_retries: default_max_retries(),
        backoff_base_ms: default_backoff_base_ms(),
      },
      cache: CacheConfig::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stockctl.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stockctl").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_fill_missing_fields() {
    let config: Config = serde_yaml::from_str(
      "api:\n  url: https://example.com/exec\n",
    )
    .unwrap();
    assert_eq!(config.api.timeout_ms, 12_000);
    assert_eq!(config.api.command_timeout_ms, 15_000);
    assert_eq!(config.api.max_retries, 2);
    assert_eq!(config.api.backoff_base_ms, 500);
    assert_eq!(config.cache.max_age_ms, 900_000);
    assert!(config.cache.path.is_none());
  }

  #[test]
  fn test_explicit_values_parse() {
    let config: Config = serde_yaml::from_str(
      "api:\n  url: https://example.com/exec\n  timeout_ms: 3000\n  max_retries: 5\ncache:\n  max_age_ms: 60000\n",
    )
    .unwrap();
    assert_eq!(config.api.timeout_ms, 3000);
    assert_eq!(config.api.max_retries, 5);
    assert_eq!(config.cache.max_age_ms, 60_000);
  }
}
