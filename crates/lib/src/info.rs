//! Virtual host and proxy URL lookup helpers.
//!
//! These read the management service's OData payloads and turn them into
//! typed records and ready-to-use base URLs.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::client::{Gateway, RemoteCallError};
use crate::manifest::{self, ManifestError};

/// Errors that can occur while reading portal information.
#[derive(Debug, Error)]
pub enum InfoError {
  /// The OData payload did not have the expected shape.
  #[error("unable to parse the management service response")]
  Parse,

  #[error(transparent)]
  Remote(#[from] RemoteCallError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),
}

/// A virtual host configured on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VirtualHost {
  pub id: String,
  pub name: String,
  #[serde(rename = "virtual_host")]
  pub host: String,
  #[serde(rename = "virtual_port", default)]
  pub port: Option<u16>,
  #[serde(rename = "isSSL", default)]
  pub ssl: bool,
  #[serde(rename = "projectPath", default)]
  pub project_path: Option<String>,
  #[serde(rename = "isDefault", default)]
  pub is_default: bool,
}

impl VirtualHost {
  /// Base URL for this virtual host, always ending in a slash.
  pub fn base_url(&self) -> String {
    let scheme = if self.ssl { "https" } else { "http" };
    let mut url = format!("{scheme}://{}", self.host);
    if let Some(port) = self.port {
      url.push_str(&format!(":{port}"));
    }
    url.push('/');
    if let Some(project) = self.project_path.as_deref().filter(|p| !p.is_empty()) {
      url.push_str(project.trim_start_matches('/'));
      url.push('/');
    }
    url
  }
}

/// Read all virtual hosts configured on the portal.
pub async fn read_all_virtual_hosts<G>(client: &G) -> Result<Vec<VirtualHost>, InfoError>
where
  G: Gateway + ?Sized,
{
  let raw = client.read_virtual_hosts().await?;
  raw.iter().map(parse_virtual_host).collect()
}

/// Read the virtual host with the given id.
pub async fn read_virtual_host_by_id<G>(client: &G, id: &str) -> Result<VirtualHost, InfoError>
where
  G: Gateway + ?Sized,
{
  let hosts = read_all_virtual_hosts(client).await?;
  hosts.into_iter().find(|host| host.id == id).ok_or_else(|| {
    error!(id, "no virtual host with the requested id");
    InfoError::Parse
  })
}

/// Read the portal's default virtual host.
pub async fn read_default_virtual_host<G>(client: &G) -> Result<VirtualHost, InfoError>
where
  G: Gateway + ?Sized,
{
  let hosts = read_all_virtual_hosts(client).await?;
  hosts.into_iter().find(|host| host.is_default).ok_or_else(|| {
    error!("no default virtual host configured");
    InfoError::Parse
  })
}

/// Compose the full base URL of a deployed proxy from its default endpoint
/// and that endpoint's default virtual host.
pub async fn proxy_url<G>(client: &G, name: &str) -> Result<String, InfoError>
where
  G: Gateway + ?Sized,
{
  let info = client.read_proxy_info(name).await?;

  let endpoint = find_default(info.get("proxyEndPoints"))?;
  let vhost_value = find_default(endpoint.get("virtualhosts"))?;
  let vhost = parse_virtual_host(vhost_value)?;
  let base_path = endpoint
    .get("base_path")
    .and_then(Value::as_str)
    .ok_or(InfoError::Parse)?;

  debug!(proxy = name, "resolved proxy url");
  Ok(format!("{}{}", vhost.base_url(), base_path.trim_start_matches('/')))
}

/// Compose the base URL of the proxy described by a manifest.
pub async fn manifest_url<G>(client: &G, manifest_path: &Path) -> Result<String, InfoError>
where
  G: Gateway + ?Sized,
{
  let manifest = manifest::parse_manifest(manifest_path)?;
  let proxy = manifest.proxy.ok_or_else(|| ManifestError::MissingProxy {
    path: manifest_path.to_path_buf(),
  })?;
  let name = proxy.name.ok_or_else(|| ManifestError::MissingProxyName {
    path: manifest_path.to_path_buf(),
  })?;
  proxy_url(client, &name).await
}

fn parse_virtual_host(value: &Value) -> Result<VirtualHost, InfoError> {
  serde_json::from_value(value.clone()).map_err(|e| {
    error!(error = %e, "malformed virtual host record");
    InfoError::Parse
  })
}

/// Pick the entry flagged `isDefault` out of an OData result list.
fn find_default(collection: Option<&Value>) -> Result<&Value, InfoError> {
  collection
    .and_then(|c| c.get("results"))
    .and_then(Value::as_array)
    .and_then(|results| {
      results
        .iter()
        .find(|entry| entry.get("isDefault").and_then(Value::as_bool) == Some(true))
    })
    .ok_or_else(|| {
      error!("no default entry in the management service response");
      InfoError::Parse
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn vhost(ssl: bool, port: Option<u16>, project_path: Option<&str>) -> VirtualHost {
    VirtualHost {
      id: "vh1".to_string(),
      name: "default".to_string(),
      host: "gw.example.com".to_string(),
      port,
      ssl,
      project_path: project_path.map(str::to_string),
      is_default: true,
    }
  }

  #[test]
  fn base_url_with_port_and_project_path() {
    let url = vhost(true, Some(8443), Some("/tenant")).base_url();
    assert_eq!(url, "https://gw.example.com:8443/tenant/");
  }

  #[test]
  fn base_url_plain_http() {
    let url = vhost(false, None, None).base_url();
    assert_eq!(url, "http://gw.example.com/");
  }

  #[test]
  fn base_url_ignores_empty_project_path() {
    let url = vhost(true, None, Some("")).base_url();
    assert_eq!(url, "https://gw.example.com/");
  }

  #[test]
  fn parses_odata_virtual_host_record() {
    let value = json!({
      "id": "vh1",
      "name": "default",
      "virtual_host": "gw.example.com",
      "virtual_port": 443,
      "isSSL": true,
      "isDefault": true
    });

    let host = parse_virtual_host(&value).unwrap();

    assert_eq!(host.host, "gw.example.com");
    assert_eq!(host.port, Some(443));
    assert!(host.ssl);
    assert!(host.is_default);
    assert_eq!(host.project_path, None);
  }

  #[test]
  fn find_default_picks_flagged_entry() {
    let collection = json!({
      "results": [
        {"id": "a", "isDefault": false},
        {"id": "b", "isDefault": true}
      ]
    });

    let entry = find_default(Some(&collection)).unwrap();

    assert_eq!(entry["id"], "b");
  }

  #[test]
  fn find_default_fails_without_flagged_entry() {
    let collection = json!({"results": [{"id": "a", "isDefault": false}]});

    assert!(matches!(find_default(Some(&collection)), Err(InfoError::Parse)));
    assert!(matches!(find_default(None), Err(InfoError::Parse)));
  }
}
