//! Deployment manifest parsing.
//!
//! A manifest is a YAML (default) or JSON document describing one proxy
//! directory and any number of key value maps deployed together:
//!
//! ```yaml
//! proxy:
//!   path: ../orders
//!   name: OrdersAPI
//!   templated: true
//!   placeholders:
//!     host: api.example.com
//! maps:
//!   orders_settings:
//!     backend: https://backend.example.com
//!     retries: 3
//! ```
//!
//! A relative `proxy.path` is rewritten to an absolute path resolved
//! against the manifest's own directory, so a manifest and its proxy
//! directory stay relocatable as a pair.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::layout::resolve_relative;

/// Errors that can occur while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// The manifest file could not be read.
  #[error("unable to read manifest '{path}'")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The manifest content could not be parsed.
  #[error("unable to parse manifest '{path}'")]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// An operation required a `proxy` section the manifest does not have.
  #[error("manifest '{path}' does not contain a proxy definition")]
  MissingProxy { path: PathBuf },

  /// An operation required the name of the deployed proxy.
  #[error("manifest '{path}' does not name a deployed proxy")]
  MissingProxyName { path: PathBuf },
}

/// Key/value pairs of one map; non-string values are serialized to JSON
/// text when the map is pushed to the portal.
pub type MapValues = BTreeMap<String, Value>;

/// A parsed deployment manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
  /// The proxy to package and upload, if any.
  #[serde(default)]
  pub proxy: Option<ProxyManifest>,

  /// Key value maps to synchronize, by map name.
  #[serde(default)]
  pub maps: Option<BTreeMap<String, MapValues>>,
}

/// The `proxy` section of a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyManifest {
  /// Proxy directory; absolute after parsing.
  pub path: PathBuf,

  /// Name of the proxy on the portal.
  #[serde(default)]
  pub name: Option<String>,

  /// Whether the directory is a template.
  #[serde(default)]
  pub templated: bool,

  /// Placeholder values for templated deployment or extraction.
  #[serde(default)]
  pub placeholders: BTreeMap<String, String>,
}

/// Parse a manifest file.
///
/// Files ending in `.json` (case-insensitive) are parsed as JSON,
/// everything else as YAML.
pub fn parse_manifest(path: &Path) -> Result<Manifest, ManifestError> {
  let content = fs::read_to_string(path).map_err(|e| ManifestError::Read {
    path: path.to_path_buf(),
    source: e,
  })?;

  let mut manifest: Manifest = if is_json(path) {
    serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?
  } else {
    serde_yaml::from_str(&content).map_err(|e| ManifestError::Parse {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?
  };

  if let Some(proxy) = &mut manifest.proxy {
    proxy.path = resolve_relative(&manifest_dir(path), &proxy.path);
  }

  debug!(manifest = %path.display(), "parsed manifest");
  Ok(manifest)
}

fn is_json(path: &Path) -> bool {
  path
    .extension()
    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
}

/// The directory the manifest lives in, made absolute so that resolved
/// proxy paths are absolute too.
fn manifest_dir(path: &Path) -> PathBuf {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  if dir.is_absolute() {
    dir
  } else {
    std::env::current_dir().map(|cwd| cwd.join(&dir)).unwrap_or(dir)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn write_manifest(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
  }

  #[test]
  fn parses_yaml_manifest() {
    let temp = TempDir::new().unwrap();
    let path = write_manifest(
      temp.path(),
      "deploy.yaml",
      "proxy:\n  path: ./orders\n  name: OrdersAPI\n  templated: true\n  placeholders:\n    host: api.example.com\nmaps:\n  settings:\n    backend: https://backend.example.com\n    retries: 3\n",
    );

    let manifest = parse_manifest(&path).unwrap();

    let proxy = manifest.proxy.unwrap();
    assert_eq!(proxy.name.as_deref(), Some("OrdersAPI"));
    assert!(proxy.templated);
    assert_eq!(proxy.placeholders["host"], "api.example.com");
    let maps = manifest.maps.unwrap();
    assert_eq!(maps["settings"]["retries"], Value::from(3));
  }

  #[test]
  fn parses_json_manifest_case_insensitive_extension() {
    let temp = TempDir::new().unwrap();
    let path = write_manifest(
      temp.path(),
      "deploy.JSON",
      r#"{"proxy": {"path": "./orders", "name": "OrdersAPI"}}"#,
    );

    let manifest = parse_manifest(&path).unwrap();

    let proxy = manifest.proxy.unwrap();
    assert_eq!(proxy.name.as_deref(), Some("OrdersAPI"));
    assert!(!proxy.templated);
    assert!(proxy.placeholders.is_empty());
  }

  #[test]
  fn proxy_path_resolves_against_manifest_directory() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("env/prod");
    fs::create_dir_all(&nested).unwrap();
    let path = write_manifest(&nested, "deploy.yaml", "proxy:\n  path: ../../proxy\n");

    let manifest = parse_manifest(&path).unwrap();

    assert_eq!(manifest.proxy.unwrap().path, temp.path().join("proxy"));
  }

  #[test]
  fn absolute_proxy_path_is_kept() {
    let temp = TempDir::new().unwrap();
    let path = write_manifest(temp.path(), "deploy.yaml", "proxy:\n  path: /srv/proxies/orders\n");

    let manifest = parse_manifest(&path).unwrap();

    assert_eq!(manifest.proxy.unwrap().path, PathBuf::from("/srv/proxies/orders"));
  }

  #[test]
  fn manifest_without_proxy_section() {
    let temp = TempDir::new().unwrap();
    let path = write_manifest(temp.path(), "maps.yaml", "maps:\n  settings:\n    a: b\n");

    let manifest = parse_manifest(&path).unwrap();

    assert!(manifest.proxy.is_none());
    assert!(manifest.maps.is_some());
  }

  #[test]
  fn unreadable_manifest_errors() {
    let result = parse_manifest(Path::new("/does/not/exist.yaml"));
    assert!(matches!(result, Err(ManifestError::Read { .. })));
  }

  #[test]
  fn malformed_manifest_errors() {
    let temp = TempDir::new().unwrap();
    let path = write_manifest(temp.path(), "bad.json", "{not json");

    let result = parse_manifest(&path);

    assert!(matches!(result, Err(ManifestError::Parse { .. })));
  }
}
