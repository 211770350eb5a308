//! Implementation of the `apim package*` commands.
//!
//! These operate purely on the local filesystem; no portal session is
//! needed.

use std::path::Path;

use anyhow::Result;
use apimgr_lib::archive::{self, PackageOptions};
use apimgr_lib::deploy;

use crate::output;

/// Package the proxy described by a manifest into a zip file.
pub fn cmd_package(manifest: &Path, target: Option<&Path>) -> Result<()> {
  deploy::package_manifest(manifest, target)?;
  output::print_success(&format!("packaged {}", manifest.display()));
  Ok(())
}

/// Package every manifest matching the pattern.
pub fn cmd_package_all(pattern: &str, force: bool) -> Result<()> {
  deploy::package_manifests_matching(pattern, force)?;
  output::print_success("batch packaging finished");
  Ok(())
}

/// Package a proxy directory into a zip file.
pub fn cmd_package_proxy(
  directory: &Path,
  target: &Path,
  placeholders: Vec<(String, String)>,
  templated: bool,
) -> Result<()> {
  let options = PackageOptions {
    templated,
    placeholders: super::placeholder_map(placeholders),
  };
  archive::package_proxy_to_file(directory, target, &options)?;
  output::print_success(&format!("wrote {}", target.display()));
  Ok(())
}
