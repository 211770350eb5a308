//! Implementation of the `apim apply-template` and `apim extract-template*`
//! commands.

use std::path::Path;

use anyhow::Result;
use apimgr_lib::deploy::{self, DownloadOptions};
use apimgr_lib::template::{self, TemplateOptions};

use crate::output;

/// Replace placeholder tokens with literal values.
pub fn cmd_apply_template(
  source: &Path,
  target: &Path,
  placeholders: Vec<(String, String)>,
  clean: bool,
) -> Result<()> {
  template::apply_template_dir(
    source,
    target,
    &super::placeholder_map(placeholders),
    TemplateOptions { clean },
  )?;
  output::print_success(&format!("applied template into {}", target.display()));
  Ok(())
}

/// Replace literal values with placeholder tokens.
pub fn cmd_extract_template(
  source: &Path,
  target: &Path,
  placeholders: Vec<(String, String)>,
  clean: bool,
) -> Result<()> {
  template::extract_template_dir(
    source,
    target,
    &super::placeholder_map(placeholders),
    TemplateOptions { clean },
  )?;
  output::print_success(&format!("extracted template into {}", target.display()));
  Ok(())
}

/// Download the proxy named by a manifest and abstract it back into its
/// template form.
pub async fn cmd_extract_template_proxy(
  manifest: &Path,
  target: Option<&Path>,
  clean: bool,
) -> Result<()> {
  let client = super::connect().await?;
  deploy::extract_template_from_manifest(&client, manifest, target, DownloadOptions { clean }).await?;
  output::print_success(&format!("extracted template from {}", manifest.display()));
  Ok(())
}
