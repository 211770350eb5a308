//! HTTP client for the API portal management endpoints.
//!
//! [`PortalClient`] owns the authenticated session: basic auth plus a CSRF
//! token fetched once when the client connects and replayed on every
//! mutating call. All primitives translate transport failures into coarse
//! errors with stable messages; the remote status and body are preserved on
//! the error and logged, never surfaced as the message itself.
//!
//! The [`Gateway`] trait is the seam the orchestrator is written against,
//! so tests can substitute an instrumented in-memory gateway.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Config;
use crate::maps::MapPayload;

const BASE_PATH: &str = "/apiportal/api/1.0";
const MAP_ENTITY_SET_URL: &str = "/Management.svc/KeyMapEntries";
const PROXY_TRANSPORT_URL: &str = "/Transport.svc/APIProxies";
const PROXY_INFO_URL: &str = "/Management.svc/APIProxies";
const VIRTUAL_HOSTS_URL: &str = "/Management.svc/VirtualHosts";
const CSRF_HEADER: &str = "x-csrf-token";

const PROXY_INFO_EXPAND: &str = "$expand=proxyEndPoints,targetEndPoints,apiProducts,\
proxyEndPoints/virtualhosts,proxyEndPoints/routeRules,proxyEndPoints/apiResources,\
policies,fileResources,targetEndPoints/properties,proxyEndPoints/properties";

/// Stable messages for the coarse remote errors.
pub const CSRF_CALL_FAILED: &str = "unable to retrieve a CSRF token";
pub const MAP_CALL_FAILED: &str = "unable to call the key value map endpoint";
pub const PROXY_CALL_FAILED: &str = "unable to call the proxy management endpoint";
pub const VHOST_CALL_FAILED: &str = "unable to call the virtual host endpoint";

/// A gateway primitive failed.
///
/// The display form is one of the stable messages above; the remote status
/// and body, when available, ride along for diagnostics.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RemoteCallError {
  message: &'static str,
  status: Option<u16>,
  body: Option<String>,
}

impl RemoteCallError {
  /// Build an error with a stable message and no remote detail.
  pub fn new(message: &'static str) -> Self {
    Self {
      message,
      status: None,
      body: None,
    }
  }

  pub fn message(&self) -> &'static str {
    self.message
  }

  pub fn status(&self) -> Option<u16> {
    self.status
  }

  pub fn body(&self) -> Option<&str> {
    self.body.as_deref()
  }
}

/// Remote operations the deployment core depends on.
#[async_trait]
pub trait Gateway: Send + Sync {
  /// Upload a proxy archive.
  async fn upload_proxy(&self, archive: &[u8]) -> Result<(), RemoteCallError>;

  /// Download the archive of a deployed proxy.
  async fn download_proxy(&self, name: &str) -> Result<Vec<u8>, RemoteCallError>;

  /// Delete a key value map. Deleting an absent map succeeds.
  async fn delete_map(&self, name: &str) -> Result<(), RemoteCallError>;

  /// Create a key value map with the given entries.
  async fn create_map(&self, name: &str, payload: &MapPayload) -> Result<(), RemoteCallError>;

  /// Read the expanded OData record of a deployed proxy.
  async fn read_proxy_info(&self, name: &str) -> Result<Value, RemoteCallError>;

  /// Read all virtual host records.
  async fn read_virtual_hosts(&self) -> Result<Vec<Value>, RemoteCallError>;
}

/// Authenticated client for one API portal.
#[derive(Clone, Debug)]
pub struct PortalClient {
  http: Client,
  base_url: String,
  username: String,
  password: String,
  csrf_token: String,
}

impl PortalClient {
  /// Build the HTTP session and fetch the CSRF token.
  pub async fn connect(config: &Config) -> Result<Self, RemoteCallError> {
    let mut builder = Client::builder().cookie_store(true);
    if let Some(proxy) = &config.proxy {
      builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(|e| wrap(CSRF_CALL_FAILED, &e))?);
    }
    let http = builder.build().map_err(|e| wrap(CSRF_CALL_FAILED, &e))?;
    let base_url = base_url(&config.host);

    let response = http
      .head(format!("{base_url}/Management.svc"))
      .basic_auth(&config.username, Some(&config.password))
      .header(CSRF_HEADER, "fetch")
      .send()
      .await
      .map_err(|e| wrap(CSRF_CALL_FAILED, &e))?;
    let response = check(CSRF_CALL_FAILED, response).await?;

    let csrf_token = response
      .headers()
      .get(CSRF_HEADER)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .to_string();
    debug!(host = %config.host, "connected to the api portal");

    Ok(Self {
      http,
      base_url,
      username: config.username.clone(),
      password: config.password.clone(),
      csrf_token,
    })
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self
      .http
      .request(method, format!("{}{}", self.base_url, path))
      .basic_auth(&self.username, Some(&self.password))
  }

  /// A request that changes remote state; carries the CSRF token.
  fn mutation(&self, method: Method, path: &str) -> RequestBuilder {
    self.request(method, path).header(CSRF_HEADER, &self.csrf_token)
  }
}

#[async_trait]
impl Gateway for PortalClient {
  async fn upload_proxy(&self, archive: &[u8]) -> Result<(), RemoteCallError> {
    let response = self
      .mutation(Method::POST, PROXY_TRANSPORT_URL)
      .header(CONTENT_TYPE, "application/octet-stream")
      .body(BASE64.encode(archive))
      .send()
      .await
      .map_err(|e| wrap(PROXY_CALL_FAILED, &e))?;
    check(PROXY_CALL_FAILED, response).await?;
    debug!("uploaded proxy archive");
    Ok(())
  }

  async fn download_proxy(&self, name: &str) -> Result<Vec<u8>, RemoteCallError> {
    let response = self
      .request(Method::GET, PROXY_TRANSPORT_URL)
      .query(&[("name", name)])
      .send()
      .await
      .map_err(|e| wrap(PROXY_CALL_FAILED, &e))?;
    let response = check(PROXY_CALL_FAILED, response).await?;
    let bytes = response.bytes().await.map_err(|e| wrap(PROXY_CALL_FAILED, &e))?;
    debug!(proxy = name, size = bytes.len(), "downloaded proxy archive");
    Ok(bytes.to_vec())
  }

  async fn delete_map(&self, name: &str) -> Result<(), RemoteCallError> {
    let path = format!("{}({})", MAP_ENTITY_SET_URL, odata_literal(name));
    let response = self
      .mutation(Method::DELETE, &path)
      .send()
      .await
      .map_err(|e| wrap(MAP_CALL_FAILED, &e))?;

    if response.status() == StatusCode::NOT_FOUND {
      debug!(map = name, "map did not exist, nothing to delete");
      return Ok(());
    }
    check(MAP_CALL_FAILED, response).await?;
    debug!(map = name, "deleted map");
    Ok(())
  }

  async fn create_map(&self, name: &str, payload: &MapPayload) -> Result<(), RemoteCallError> {
    let response = self
      .mutation(Method::POST, MAP_ENTITY_SET_URL)
      .json(payload)
      .send()
      .await
      .map_err(|e| wrap(MAP_CALL_FAILED, &e))?;
    check(MAP_CALL_FAILED, response).await?;
    debug!(map = name, "created map");
    Ok(())
  }

  async fn read_proxy_info(&self, name: &str) -> Result<Value, RemoteCallError> {
    let path = format!("{}({})?{}", PROXY_INFO_URL, odata_literal(name), PROXY_INFO_EXPAND);
    let response = self
      .request(Method::GET, &path)
      .header(reqwest::header::ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| wrap(PROXY_CALL_FAILED, &e))?;
    let response = check(PROXY_CALL_FAILED, response).await?;
    let mut value: Value = response.json().await.map_err(|e| wrap(PROXY_CALL_FAILED, &e))?;
    debug!(proxy = name, "read proxy info");
    Ok(value.get_mut("d").map(Value::take).unwrap_or(Value::Null))
  }

  async fn read_virtual_hosts(&self) -> Result<Vec<Value>, RemoteCallError> {
    let response = self
      .request(Method::GET, VIRTUAL_HOSTS_URL)
      .header(reqwest::header::ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| wrap(VHOST_CALL_FAILED, &e))?;
    let response = check(VHOST_CALL_FAILED, response).await?;
    let value: Value = response.json().await.map_err(|e| wrap(VHOST_CALL_FAILED, &e))?;
    debug!("read virtual host info");
    Ok(
      value
        .get("d")
        .and_then(|d| d.get("results"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default(),
    )
  }
}

/// Render a string as an OData literal, doubling embedded quotes.
fn odata_literal(literal: &str) -> String {
  format!("'{}'", literal.replace('\'', "''"))
}

fn base_url(host: &str) -> String {
  if host.starts_with("http://") || host.starts_with("https://") {
    format!("{}{}", host.trim_end_matches('/'), BASE_PATH)
  } else {
    format!("https://{host}{BASE_PATH}")
  }
}

/// Wrap a transport-level failure into a coarse stable error.
fn wrap(message: &'static str, source: &reqwest::Error) -> RemoteCallError {
  error!(error = %source, "{}", message);
  RemoteCallError {
    message,
    status: source.status().map(|s| s.as_u16()),
    body: None,
  }
}

/// Turn a non-success response into a coarse stable error carrying the
/// remote status and body.
async fn check(message: &'static str, response: Response) -> Result<Response, RemoteCallError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  error!(status = status.as_u16(), body = %body, "{}", message);
  Err(RemoteCallError {
    message,
    status: Some(status.as_u16()),
    body: Some(body),
  })
}
