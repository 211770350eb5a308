//! Implementation of the `apim deploy*` commands.

use std::path::Path;

use anyhow::Result;
use apimgr_lib::archive::PackageOptions;
use apimgr_lib::deploy;

use crate::output;

/// Deploy a single manifest: proxy first, then its key value maps.
pub async fn cmd_deploy(manifest: &Path) -> Result<()> {
  let client = super::connect().await?;
  deploy::deploy_manifest(&client, manifest).await?;
  output::print_success(&format!("deployed {}", manifest.display()));
  Ok(())
}

/// Deploy every manifest matching the pattern, strictly one at a time.
pub async fn cmd_deploy_all(pattern: &str, force: bool) -> Result<()> {
  let client = super::connect().await?;
  deploy::deploy_manifests_matching(&client, pattern, force).await?;
  output::print_success("batch deployment finished");
  Ok(())
}

/// Package a proxy directory and upload the archive.
pub async fn cmd_deploy_proxy(
  directory: &Path,
  placeholders: Vec<(String, String)>,
  templated: bool,
) -> Result<()> {
  let client = super::connect().await?;
  let options = PackageOptions {
    templated,
    placeholders: super::placeholder_map(placeholders),
  };
  deploy::deploy_proxy(&client, directory, &options).await?;
  output::print_success(&format!("deployed proxy from {}", directory.display()));
  Ok(())
}
