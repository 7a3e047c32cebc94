//! Configuration loader and validator for the dashboard sync server.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub provider: Provider,
    pub sync: Sync,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
    /// Public base URL used to build the OAuth redirect URI.
    pub base_url: String,
}

/// OAuth + API settings for the meetings provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    /// Route prefix: endpoints are mounted at /api/{name}/...
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
    pub scope: String,
}

/// Background sync settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sync {
    pub auto_sync: bool,
    pub interval_minutes: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/api/{}/callback",
            self.app.base_url.trim_end_matches('/'),
            self.provider.name
        )
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.base_url must be non-empty"));
    }

    if cfg.provider.name.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.name must be non-empty"));
    }
    if cfg.provider.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.client_id must be non-empty"));
    }
    if cfg.provider.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.client_secret must be non-empty",
        ));
    }
    if cfg.provider.authorize_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.authorize_url must be non-empty",
        ));
    }
    if cfg.provider.token_url.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.token_url must be non-empty"));
    }
    if cfg.provider.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.api_base must be non-empty"));
    }

    if cfg.sync.interval_minutes == 0 {
        return Err(ConfigError::Invalid("sync.interval_minutes must be > 0"));
    }

    Ok(())
}

/// Example YAML document matching the schema above.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "127.0.0.1:3000"
  base_url: "http://localhost:3000"

provider:
  name: "meetings"
  client_id: "YOUR_CLIENT_ID"
  client_secret: "YOUR_CLIENT_SECRET"
  authorize_url: "https://provider.example/oauth2/authorize"
  token_url: "https://provider.example/oauth2/token"
  api_base: "https://api.provider.example/v1"
  scope: "public_api"

sync:
  auto_sync: true
  interval_minutes: 30
"#
}
