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
  /// Base URL of the PromptRepo backend, e.g. `https://promptrepo.example.com`
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_prompt_ttl_secs")]
  pub prompt_ttl_secs: u64,
  #[serde(default = "default_prompt_ttl_secs")]
  pub eval_ttl_secs: u64,
  #[serde(default = "default_config_ttl_secs")]
  pub config_ttl_secs: u64,
  #[serde(default = "default_auth_ttl_secs")]
  pub auth_ttl_secs: u64,
  /// Directory for persisted store snapshots (defaults to the user data dir)
  pub dir: Option<PathBuf>,
}

fn default_prompt_ttl_secs() -> u64 {
  60 * 60
}

fn default_config_ttl_secs() -> u64 {
  5 * 60
}

fn default_auth_ttl_secs() -> u64 {
  15 * 60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prompt_ttl_secs: default_prompt_ttl_secs(),
      eval_ttl_secs: default_prompt_ttl_secs(),
      config_ttl_secs: default_config_ttl_secs(),
      auth_ttl_secs: default_auth_ttl_secs(),
      dir: None,
    }
  }
}

impl CacheConfig {
  pub fn prompt_ttl(&self) -> Duration {
    Duration::from_secs(self.prompt_ttl_secs)
  }

  pub fn eval_ttl(&self) -> Duration {
    Duration::from_secs(self.eval_ttl_secs)
  }

  pub fn config_ttl(&self) -> Duration {
    Duration::from_secs(self.config_ttl_secs)
  }

  pub fn auth_ttl(&self) -> Duration {
    Duration::from_secs(self.auth_ttl_secs)
  }

  /// Resolve the storage directory.
  pub fn storage_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("promptrepo"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./promptrepo.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/promptrepo/config.yaml
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
        "No configuration file found. Create one at ~/.config/promptrepo/config.yaml\n\
                 with at least:\n  api:\n    url: https://your-promptrepo-host"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("promptrepo.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("promptrepo").join("config.yaml");
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

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks PROMPTREPO_TOKEN first, then PROMPTREPO_API_TOKEN. Individual
  /// hosting needs no token, so absence is not an error.
  pub fn api_token() -> Option<String> {
    std::env::var("PROMPTREPO_TOKEN")
      .or_else(|_| std::env::var("PROMPTREPO_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
