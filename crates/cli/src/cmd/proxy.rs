//! Implementation of the `apim download-proxy` and `apim upload-proxy`
//! commands.

use std::path::Path;

use anyhow::Result;
use apimgr_lib::deploy::{self, ArchiveSource, DownloadOptions};

use crate::output;

/// Download a deployed proxy archive and unpack it.
pub async fn cmd_download_proxy(name: &str, directory: &Path, clean: bool) -> Result<()> {
  let client = super::connect().await?;
  deploy::download_proxy(&client, name, directory, DownloadOptions { clean }).await?;
  output::print_success(&format!("downloaded {} into {}", name, directory.display()));
  Ok(())
}

/// Upload a prebuilt proxy archive file.
pub async fn cmd_upload_proxy(file: &Path) -> Result<()> {
  let client = super::connect().await?;
  deploy::upload_proxy(&client, &ArchiveSource::Path(file.to_path_buf())).await?;
  output::print_success(&format!("uploaded {}", file.display()));
  Ok(())
}
