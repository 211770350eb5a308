//! Manifest-driven deployment orchestration.
//!
//! A manifest couples one proxy directory with any number of key value
//! maps. Deploying it always uploads the proxy before touching the maps:
//! map values may need to exist before the proxy that reads them goes
//! live, so the two steps are never reordered or interleaved. Batch
//! operations expand a glob pattern and work through the matches strictly
//! one at a time, because different manifests may touch the same remote
//! resources.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::{self, ArchiveError, PackageOptions};
use crate::client::{Gateway, RemoteCallError};
use crate::manifest::{self, ManifestError, ProxyManifest};
use crate::maps::{self, MapSyncError};
use crate::template::{self, TemplateError};
use crate::util::prepare_dir;

/// Errors that can occur while orchestrating deployments.
#[derive(Debug, Error)]
pub enum DeployError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Template(#[from] TemplateError),

  #[error(transparent)]
  MapSync(#[from] MapSyncError),

  #[error(transparent)]
  Remote(#[from] RemoteCallError),

  /// A manifest deployment failed; carries the manifest's file name.
  #[error("unable to deploy manifest '{name}'")]
  ManifestFailed {
    name: String,
    #[source]
    source: Box<DeployError>,
  },

  /// A manifest packaging run failed; carries the manifest's file name.
  #[error("unable to package manifest '{name}'")]
  PackageFailed {
    name: String,
    #[source]
    source: Box<DeployError>,
  },

  /// A template extraction failed; carries the manifest's file name.
  #[error("unable to extract template from manifest '{name}'")]
  ExtractFailed {
    name: String,
    #[source]
    source: Box<DeployError>,
  },

  /// The batch glob pattern is malformed.
  #[error("invalid glob pattern '{pattern}'")]
  Pattern {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  /// A matched path could not be read during pattern expansion.
  #[error("unable to expand glob pattern")]
  Glob(#[source] glob::GlobError),

  /// A prebuilt archive file could not be read.
  #[error("unable to read archive file '{path}'")]
  ReadArchive {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The download target directory could not be prepared.
  #[error("unable to prepare directory '{path}'")]
  PrepareDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Tagged source for a prebuilt proxy archive.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
  /// A zip file on disk.
  Path(PathBuf),
  /// An archive already held in memory.
  Bytes(Vec<u8>),
}

/// Options for downloading a proxy or extracting a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
  /// Remove any previous contents of the target directory first.
  pub clean: bool,
}

/// Package a proxy directory and upload the archive.
pub async fn deploy_proxy<G>(
  client: &G,
  directory: &Path,
  options: &PackageOptions,
) -> Result<(), DeployError>
where
  G: Gateway + ?Sized,
{
  let bytes = archive::package_proxy(directory, options)?;
  client.upload_proxy(&bytes).await?;
  debug!(directory = %directory.display(), "deployed proxy");
  Ok(())
}

/// Upload a prebuilt proxy archive from a file or from memory.
pub async fn upload_proxy<G>(client: &G, source: &ArchiveSource) -> Result<(), DeployError>
where
  G: Gateway + ?Sized,
{
  match source {
    ArchiveSource::Path(path) => {
      let bytes = fs::read(path).map_err(|e| DeployError::ReadArchive {
        path: path.clone(),
        source: e,
      })?;
      client.upload_proxy(&bytes).await?;
    }
    ArchiveSource::Bytes(bytes) => client.upload_proxy(bytes).await?,
  }
  info!("uploaded proxy archive");
  Ok(())
}

/// Download a deployed proxy and unpack it into `directory`.
pub async fn download_proxy<G>(
  client: &G,
  name: &str,
  directory: &Path,
  options: DownloadOptions,
) -> Result<(), DeployError>
where
  G: Gateway + ?Sized,
{
  prepare_dir(directory, options.clean).map_err(|e| DeployError::PrepareDir {
    path: directory.to_path_buf(),
    source: e,
  })?;
  let bytes = client.download_proxy(name).await?;
  archive::unpack_archive(&bytes, directory)?;
  info!(proxy = name, directory = %directory.display(), "downloaded proxy");
  Ok(())
}

/// Deploy the artifacts described by a manifest: the proxy first, then,
/// only after the upload finished, all key value maps.
///
/// Any failure aborts the manifest and is wrapped with its file name.
pub async fn deploy_manifest<G>(client: &G, path: &Path) -> Result<(), DeployError>
where
  G: Gateway + Clone + 'static,
{
  match deploy_manifest_inner(client, path).await {
    Ok(()) => {
      info!(manifest = %display_name(path), "deployed manifest");
      Ok(())
    }
    Err(e) => {
      error!(manifest = %display_name(path), error = %e, "unable to deploy manifest");
      Err(DeployError::ManifestFailed {
        name: display_name(path),
        source: Box::new(e),
      })
    }
  }
}

async fn deploy_manifest_inner<G>(client: &G, path: &Path) -> Result<(), DeployError>
where
  G: Gateway + Clone + 'static,
{
  let manifest = manifest::parse_manifest(path)?;

  if let Some(proxy) = &manifest.proxy {
    deploy_proxy(client, &proxy.path, &package_options(proxy)).await?;
  }
  if let Some(maps) = &manifest.maps {
    maps::synchronize_all(client, maps).await?;
  }
  Ok(())
}

/// Deploy every manifest matching the glob pattern, strictly one at a
/// time, in the order the expansion yields.
///
/// Without `force` the first failing manifest aborts the rest of the
/// batch. With `force` a failure is logged and the batch continues; the
/// caller cannot tell a forced run with failures from a clean one except
/// through the logs.
pub async fn deploy_manifests_matching<G>(
  client: &G,
  pattern: &str,
  force: bool,
) -> Result<(), DeployError>
where
  G: Gateway + Clone + 'static,
{
  for path in expand_pattern(pattern)? {
    match deploy_manifest(client, &path).await {
      Ok(()) => {}
      Err(e) if force => {
        warn!(manifest = %path.display(), error = %e, "skipping failed manifest");
      }
      Err(e) => return Err(e),
    }
  }
  Ok(())
}

/// Package the proxy described by a manifest into a zip file.
///
/// The default target is the manifest path with a `.zip` extension. A
/// manifest without a proxy section is a warning, not an error.
pub fn package_manifest(path: &Path, target: Option<&Path>) -> Result<(), DeployError> {
  match package_manifest_inner(path, target) {
    Ok(()) => Ok(()),
    Err(e) => {
      error!(manifest = %display_name(path), error = %e, "unable to package manifest");
      Err(DeployError::PackageFailed {
        name: display_name(path),
        source: Box::new(e),
      })
    }
  }
}

fn package_manifest_inner(path: &Path, target: Option<&Path>) -> Result<(), DeployError> {
  let manifest = manifest::parse_manifest(path)?;
  let Some(proxy) = &manifest.proxy else {
    warn!(manifest = %path.display(), "manifest does not contain a proxy definition");
    return Ok(());
  };

  let target = target.map(Path::to_path_buf).unwrap_or_else(|| path.with_extension("zip"));
  archive::package_proxy_to_file(&proxy.path, &target, &package_options(proxy))?;
  info!(manifest = %display_name(path), target = %target.display(), "packaged manifest");
  Ok(())
}

/// Package every manifest matching the glob pattern, one at a time; same
/// `force` semantics as [`deploy_manifests_matching`].
pub fn package_manifests_matching(pattern: &str, force: bool) -> Result<(), DeployError> {
  for path in expand_pattern(pattern)? {
    match package_manifest(&path, None) {
      Ok(()) => {}
      Err(e) if force => {
        warn!(manifest = %path.display(), error = %e, "skipping failed manifest");
      }
      Err(e) => return Err(e),
    }
  }
  Ok(())
}

/// Download the proxy named by a manifest and turn the downloaded copy
/// back into a template using the manifest's placeholders.
///
/// The manifest must have a proxy section naming the deployed proxy. When
/// `target` is omitted, the manifest's own proxy path is used.
pub async fn extract_template_from_manifest<G>(
  client: &G,
  manifest_path: &Path,
  target: Option<&Path>,
  options: DownloadOptions,
) -> Result<(), DeployError>
where
  G: Gateway + ?Sized,
{
  match extract_inner(client, manifest_path, target, options).await {
    Ok(()) => {
      info!(manifest = %display_name(manifest_path), "extracted template");
      Ok(())
    }
    Err(e) => {
      error!(manifest = %display_name(manifest_path), error = %e, "unable to extract template");
      Err(DeployError::ExtractFailed {
        name: display_name(manifest_path),
        source: Box::new(e),
      })
    }
  }
}

async fn extract_inner<G>(
  client: &G,
  manifest_path: &Path,
  target: Option<&Path>,
  options: DownloadOptions,
) -> Result<(), DeployError>
where
  G: Gateway + ?Sized,
{
  let manifest = manifest::parse_manifest(manifest_path)?;
  let Some(proxy) = &manifest.proxy else {
    return Err(ManifestError::MissingProxy {
      path: manifest_path.to_path_buf(),
    }
    .into());
  };
  let name = proxy.name.as_deref().ok_or_else(|| ManifestError::MissingProxyName {
    path: manifest_path.to_path_buf(),
  })?;

  let target = target.unwrap_or(&proxy.path);
  download_proxy(client, name, target, options).await?;
  template::extract_template(target, target, &proxy.placeholders)?;
  Ok(())
}

fn package_options(proxy: &ProxyManifest) -> PackageOptions {
  PackageOptions {
    templated: proxy.templated,
    placeholders: proxy.placeholders.clone(),
  }
}

fn display_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}

/// Expand a glob pattern into the ordered list of matching paths.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, DeployError> {
  let paths = glob::glob(pattern).map_err(|e| DeployError::Pattern {
    pattern: pattern.to_string(),
    source: e,
  })?;

  let mut matches = Vec::new();
  for path in paths {
    matches.push(path.map_err(DeployError::Glob)?);
  }
  debug!(pattern, count = matches.len(), "expanded manifest pattern");
  Ok(matches)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::{PROXY_CALL_FAILED, RemoteCallError};
  use crate::consts::PROXY_FOLDER;
  use crate::maps::MapPayload;
  use async_trait::async_trait;
  use serde_json::Value;
  use std::sync::{Arc, Mutex};
  use tempfile::TempDir;

  /// Gateway double that records every remote call in order.
  #[derive(Clone, Default)]
  struct RecordingGateway {
    calls: Arc<Mutex<Vec<String>>>,
    fail_upload: bool,
    download_body: Arc<Vec<u8>>,
  }

  impl RecordingGateway {
    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
      self.calls.lock().unwrap().push(call);
    }
  }

  #[async_trait]
  impl Gateway for RecordingGateway {
    async fn upload_proxy(&self, _archive: &[u8]) -> Result<(), RemoteCallError> {
      self.record("upload".to_string());
      if self.fail_upload {
        Err(RemoteCallError::new(PROXY_CALL_FAILED))
      } else {
        Ok(())
      }
    }

    async fn download_proxy(&self, name: &str) -> Result<Vec<u8>, RemoteCallError> {
      self.record(format!("download:{name}"));
      Ok(self.download_body.as_ref().clone())
    }

    async fn delete_map(&self, name: &str) -> Result<(), RemoteCallError> {
      self.record(format!("delete:{name}"));
      Ok(())
    }

    async fn create_map(&self, name: &str, _payload: &MapPayload) -> Result<(), RemoteCallError> {
      self.record(format!("create:{name}"));
      Ok(())
    }

    async fn read_proxy_info(&self, _name: &str) -> Result<Value, RemoteCallError> {
      Ok(Value::Null)
    }

    async fn read_virtual_hosts(&self) -> Result<Vec<Value>, RemoteCallError> {
      Ok(Vec::new())
    }
  }

  fn write_proxy_dir(dir: &Path, content: &str) {
    let root = dir.join(PROXY_FOLDER);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("proxy.xml"), content).unwrap();
  }

  fn write_manifest(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
  }

  #[tokio::test]
  async fn proxy_uploads_before_any_map_call() {
    let temp = TempDir::new().unwrap();
    write_proxy_dir(&temp.path().join("orders"), "<p/>");
    let manifest = write_manifest(
      temp.path(),
      "deploy.yaml",
      "proxy:\n  path: ./orders\nmaps:\n  settings:\n    a: x\n  limits:\n    b: y\n",
    );
    let gateway = RecordingGateway::default();

    deploy_manifest(&gateway, &manifest).await.unwrap();

    let calls = gateway.calls();
    let upload_at = calls.iter().position(|c| c == "upload").unwrap();
    let first_map_call = calls
      .iter()
      .position(|c| c.starts_with("delete:") || c.starts_with("create:"))
      .unwrap();
    assert!(upload_at < first_map_call);
    // Both maps were synchronized, each with delete before create.
    for map in ["settings", "limits"] {
      let delete = calls.iter().position(|c| *c == format!("delete:{map}")).unwrap();
      let create = calls.iter().position(|c| *c == format!("create:{map}")).unwrap();
      assert!(delete < create);
    }
  }

  #[tokio::test]
  async fn manifest_without_proxy_only_syncs_maps() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), "maps.yaml", "maps:\n  settings:\n    a: x\n");
    let gateway = RecordingGateway::default();

    deploy_manifest(&gateway, &manifest).await.unwrap();

    assert_eq!(gateway.calls(), vec!["delete:settings", "create:settings"]);
  }

  #[tokio::test]
  async fn failure_is_wrapped_with_manifest_name() {
    let temp = TempDir::new().unwrap();
    write_proxy_dir(&temp.path().join("orders"), "<p/>");
    let manifest = write_manifest(temp.path(), "deploy.yaml", "proxy:\n  path: ./orders\n");
    let gateway = RecordingGateway {
      fail_upload: true,
      ..RecordingGateway::default()
    };

    let err = deploy_manifest(&gateway, &manifest).await.unwrap_err();

    assert!(matches!(err, DeployError::ManifestFailed { ref name, .. } if name == "deploy.yaml"));
  }

  #[tokio::test]
  async fn forced_batch_continues_past_failures() {
    let temp = TempDir::new().unwrap();
    write_proxy_dir(&temp.path().join("first"), "<p/>");
    write_proxy_dir(&temp.path().join("third"), "<p/>");
    write_manifest(temp.path(), "a-first.yaml", "proxy:\n  path: ./first\n");
    // Second manifest points at a directory that does not exist.
    write_manifest(temp.path(), "b-second.yaml", "proxy:\n  path: ./missing\n");
    write_manifest(temp.path(), "c-third.yaml", "proxy:\n  path: ./third\n");
    let pattern = temp.path().join("*.yaml");
    let gateway = RecordingGateway::default();

    deploy_manifests_matching(&gateway, pattern.to_str().unwrap(), true)
      .await
      .unwrap();

    assert_eq!(gateway.calls(), vec!["upload", "upload"]);
  }

  #[tokio::test]
  async fn unforced_batch_stops_at_first_failure() {
    let temp = TempDir::new().unwrap();
    write_proxy_dir(&temp.path().join("first"), "<p/>");
    write_proxy_dir(&temp.path().join("third"), "<p/>");
    write_manifest(temp.path(), "a-first.yaml", "proxy:\n  path: ./first\n");
    write_manifest(temp.path(), "b-second.yaml", "proxy:\n  path: ./missing\n");
    write_manifest(temp.path(), "c-third.yaml", "proxy:\n  path: ./third\n");
    let pattern = temp.path().join("*.yaml");
    let gateway = RecordingGateway::default();

    let result = deploy_manifests_matching(&gateway, pattern.to_str().unwrap(), false).await;

    assert!(result.is_err());
    assert_eq!(gateway.calls(), vec!["upload"]);
  }

  #[tokio::test]
  async fn extract_requires_proxy_section() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), "maps.yaml", "maps:\n  settings:\n    a: x\n");
    let gateway = RecordingGateway::default();

    let err = extract_template_from_manifest(&gateway, &manifest, None, DownloadOptions::default())
      .await
      .unwrap_err();

    assert!(matches!(err, DeployError::ExtractFailed { .. }));
  }

  #[tokio::test]
  async fn extract_downloads_and_abstracts_in_place() {
    let temp = TempDir::new().unwrap();

    // Build a real archive to serve as the "deployed" proxy.
    let deployed = temp.path().join("deployed");
    write_proxy_dir(&deployed, "<target>api.example.com</target>");
    let bytes = archive::package_proxy(&deployed, &PackageOptions::default()).unwrap();

    let manifest = write_manifest(
      temp.path(),
      "orders.yaml",
      "proxy:\n  path: ./orders\n  name: OrdersAPI\n  placeholders:\n    host: api.example.com\n",
    );
    let gateway = RecordingGateway {
      download_body: Arc::new(bytes),
      ..RecordingGateway::default()
    };

    let target = temp.path().join("template");
    extract_template_from_manifest(&gateway, &manifest, Some(&target), DownloadOptions::default())
      .await
      .unwrap();

    assert_eq!(gateway.calls(), vec!["download:OrdersAPI"]);
    let extracted = fs::read_to_string(target.join(PROXY_FOLDER).join("proxy.xml")).unwrap();
    assert_eq!(extracted, "<target>{{host}}</target>");
  }

  #[test]
  fn package_manifest_defaults_target_beside_manifest() {
    let temp = TempDir::new().unwrap();
    write_proxy_dir(&temp.path().join("orders"), "<p/>");
    let manifest = write_manifest(temp.path(), "orders.yaml", "proxy:\n  path: ./orders\n");

    package_manifest(&manifest, None).unwrap();

    assert!(temp.path().join("orders.zip").is_file());
  }

  #[test]
  fn package_manifest_without_proxy_is_a_noop() {
    let temp = TempDir::new().unwrap();
    let manifest = write_manifest(temp.path(), "maps.yaml", "maps:\n  settings:\n    a: x\n");

    package_manifest(&manifest, None).unwrap();

    assert!(!temp.path().join("maps.zip").exists());
  }

  #[tokio::test]
  async fn upload_proxy_reads_archive_from_disk() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("proxy.zip");
    fs::write(&file, b"zip-bytes").unwrap();
    let gateway = RecordingGateway::default();

    upload_proxy(&gateway, &ArchiveSource::Path(file)).await.unwrap();
    upload_proxy(&gateway, &ArchiveSource::Bytes(b"more".to_vec()))
      .await
      .unwrap();

    assert_eq!(gateway.calls(), vec!["upload", "upload"]);
  }

  #[tokio::test]
  async fn upload_proxy_missing_file_errors() {
    let gateway = RecordingGateway::default();

    let result = upload_proxy(&gateway, &ArchiveSource::Path(PathBuf::from("/no/such.zip"))).await;

    assert!(matches!(result, Err(DeployError::ReadArchive { .. })));
    assert!(gateway.calls().is_empty());
  }
}
