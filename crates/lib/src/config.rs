//! Portal connection configuration.
//!
//! Configuration is resolved once at startup, from the environment with an
//! optional JSON config file as fallback, and then passed explicitly into
//! the client; no process-wide cache exists. The config file is `.apimgr`
//! in the working directory, else in the home directory:
//!
//! ```json
//! {
//!   "host": "portal.example.com",
//!   "username": "deployer",
//!   "password": "secret",
//!   "proxy": "http://corporate-proxy:3128"
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable overriding the configured host.
pub const HOST_VAR: &str = "APIMGR_HOST";
/// Environment variable overriding the configured username.
pub const USERNAME_VAR: &str = "APIMGR_USERNAME";
/// Environment variable overriding the configured password.
pub const PASSWORD_VAR: &str = "APIMGR_PASSWORD";
/// Environment variable naming an HTTPS proxy server.
pub const PROXY_VAR: &str = "HTTPS_PROXY";

const CONFIG_FILENAME: &str = ".apimgr";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("the portal host, username and password are mandatory configuration attributes")]
  MissingCredentials,

  #[error("configuration file already exists: {0}")]
  AlreadyExists(PathBuf),

  #[error("unable to write configuration file '{path}'")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Connection settings for one API portal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  pub host: String,
  pub username: String,
  pub password: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proxy: Option<String>,
}

/// Config file content with every field optional, merged with the
/// environment before validation.
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfig {
  host: Option<String>,
  username: Option<String>,
  password: Option<String>,
  proxy: Option<String>,
}

impl Config {
  /// Load configuration from the environment and the `.apimgr` file.
  ///
  /// Environment variables win over file values. Host, username and
  /// password are mandatory.
  pub fn load() -> Result<Self, ConfigError> {
    let file = load_config_file(Path::new(CONFIG_FILENAME))
      .or_else(|| dirs::home_dir().and_then(|home| load_config_file(&home.join(CONFIG_FILENAME))))
      .unwrap_or_default();
    resolve(file)
  }

  /// Write this configuration as a `.apimgr` file, in the home directory
  /// when `global` is set, else in the working directory.
  pub fn save(&self, global: bool, overwrite: bool) -> Result<PathBuf, ConfigError> {
    let path = if global {
      dirs::home_dir().unwrap_or_default().join(CONFIG_FILENAME)
    } else {
      PathBuf::from(CONFIG_FILENAME)
    };
    if path.exists() && !overwrite {
      return Err(ConfigError::AlreadyExists(path));
    }

    let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Write {
      path: path.clone(),
      source: io::Error::other(e),
    })?;
    fs::write(&path, content).map_err(|e| ConfigError::Write {
      path: path.clone(),
      source: e,
    })?;
    Ok(path)
  }
}

/// Merge environment values over the file values and validate.
fn resolve(file: PartialConfig) -> Result<Config, ConfigError> {
  let host = env_or(HOST_VAR, "host", file.host);
  let username = env_or(USERNAME_VAR, "username", file.username);
  let password = env_or(PASSWORD_VAR, "password", file.password);
  let proxy = env_or(PROXY_VAR, "proxy", file.proxy);

  match (host, username, password) {
    (Some(host), Some(username), Some(password)) => Ok(Config {
      host,
      username,
      password,
      proxy,
    }),
    _ => Err(ConfigError::MissingCredentials),
  }
}

fn env_or(var: &str, field: &str, fallback: Option<String>) -> Option<String> {
  match std::env::var(var) {
    Ok(value) if !value.is_empty() => {
      debug!("using {} from the environment", field);
      Some(value)
    }
    _ => fallback,
  }
}

fn load_config_file(path: &Path) -> Option<PartialConfig> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      debug!(path = %path.display(), "no configuration file found");
      return None;
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unable to read configuration file");
      return None;
    }
  };

  match serde_json::from_str(&content) {
    Ok(config) => {
      debug!(path = %path.display(), "loaded configuration file");
      Some(config)
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "unable to parse configuration file");
      None
    }
  }
}
