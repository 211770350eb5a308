mod deploy;
mod package;
mod proxy;
mod template;

pub use deploy::{cmd_deploy, cmd_deploy_all, cmd_deploy_proxy};
pub use package::{cmd_package, cmd_package_all, cmd_package_proxy};
pub use proxy::{cmd_download_proxy, cmd_upload_proxy};
pub use template::{cmd_apply_template, cmd_extract_template, cmd_extract_template_proxy};

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use apimgr_lib::client::PortalClient;
use apimgr_lib::config::Config;
use tracing::debug;

/// Load configuration and open an authenticated portal session.
async fn connect() -> Result<PortalClient> {
  let config = Config::load().context("configuration is incomplete")?;
  debug!(host = %config.host, "opening portal session");
  PortalClient::connect(&config)
    .await
    .context("unable to connect to the api portal")
}

/// Collect parsed key=value pairs into a placeholder map.
fn placeholder_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
  pairs.into_iter().collect()
}
