//! apim: command line interface for the API portal deployment toolkit.

mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Deployment toolkit for the API portal: package proxies, apply and
/// extract templates, and deploy manifests.
#[derive(Parser)]
#[command(name = "apim", version, about, long_about = None)]
struct Cli {
  /// Suppress console log output
  #[arg(short, long, global = true)]
  silent: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Deploy the artifacts described by a manifest
  Deploy {
    /// Path to the manifest file
    manifest: PathBuf,
  },

  /// Deploy every manifest matching a glob pattern, one at a time
  DeployAll {
    /// Glob pattern selecting manifest files
    pattern: String,

    /// Continue with the remaining manifests if one fails
    #[arg(short, long)]
    force: bool,
  },

  /// Package a proxy directory and upload it
  DeployProxy {
    /// Directory containing the proxy files
    directory: PathBuf,

    /// Placeholder values as key=value pairs
    #[arg(value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Treat the directory as a template
    #[arg(short, long)]
    templated: bool,
  },

  /// Download a deployed proxy into a directory
  DownloadProxy {
    /// Name of the deployed proxy
    name: String,

    /// Target directory
    directory: PathBuf,

    /// Empty the target directory first
    #[arg(long)]
    clean: bool,
  },

  /// Replace literal values with placeholder tokens
  ExtractTemplate {
    /// Directory containing the concrete proxy files
    source: PathBuf,

    /// Target directory for the template
    target: PathBuf,

    /// Placeholder values as key=value pairs
    #[arg(value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Empty the target directory first
    #[arg(long)]
    clean: bool,
  },

  /// Extract a template from the deployed proxy described by a manifest
  ExtractTemplateProxy {
    /// Path to the manifest file
    manifest: PathBuf,

    /// Target directory (defaults to the manifest's proxy path)
    target: Option<PathBuf>,

    /// Empty the target directory first
    #[arg(long)]
    clean: bool,
  },

  /// Package the proxy described by a manifest into a zip file
  Package {
    /// Path to the manifest file
    manifest: PathBuf,

    /// Target zip file (defaults to the manifest path with .zip)
    target: Option<PathBuf>,
  },

  /// Package every manifest matching a glob pattern
  PackageAll {
    /// Glob pattern selecting manifest files
    pattern: String,

    /// Continue with the remaining manifests if one fails
    #[arg(short, long)]
    force: bool,
  },

  /// Package a proxy directory into a zip file
  PackageProxy {
    /// Directory containing the proxy files
    directory: PathBuf,

    /// Target zip file
    target: PathBuf,

    /// Placeholder values as key=value pairs
    #[arg(value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Treat the directory as a template
    #[arg(short, long)]
    templated: bool,
  },

  /// Upload a prebuilt proxy archive
  UploadProxy {
    /// Path to the zip file
    file: PathBuf,
  },

  /// Replace placeholder tokens with literal values
  ApplyTemplate {
    /// Directory containing the template files
    source: PathBuf,

    /// Target directory for the concrete proxy
    target: PathBuf,

    /// Placeholder values as key=value pairs
    #[arg(value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Empty the target directory first
    #[arg(long)]
    clean: bool,
  },
}

fn parse_placeholder(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.silent);

  if let Err(e) = execute(cli.command) {
    output::print_error(&format!("{e:#}"));
    std::process::exit(1);
  }
}

fn init_tracing(silent: bool) {
  let filter = if silent {
    EnvFilter::new("off")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };
  tracing_subscriber::fmt().with_env_filter(filter).without_time().init();
}

fn execute(command: Commands) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  rt.block_on(run(command))
}

async fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Deploy { manifest } => cmd::cmd_deploy(&manifest).await,
    Commands::DeployAll { pattern, force } => cmd::cmd_deploy_all(&pattern, force).await,
    Commands::DeployProxy {
      directory,
      placeholders,
      templated,
    } => cmd::cmd_deploy_proxy(&directory, placeholders, templated).await,
    Commands::DownloadProxy {
      name,
      directory,
      clean,
    } => cmd::cmd_download_proxy(&name, &directory, clean).await,
    Commands::ExtractTemplate {
      source,
      target,
      placeholders,
      clean,
    } => cmd::cmd_extract_template(&source, &target, placeholders, clean),
    Commands::ExtractTemplateProxy {
      manifest,
      target,
      clean,
    } => cmd::cmd_extract_template_proxy(&manifest, target.as_deref(), clean).await,
    Commands::Package { manifest, target } => cmd::cmd_package(&manifest, target.as_deref()),
    Commands::PackageAll { pattern, force } => cmd::cmd_package_all(&pattern, force),
    Commands::PackageProxy {
      directory,
      target,
      placeholders,
      templated,
    } => cmd::cmd_package_proxy(&directory, &target, placeholders, templated),
    Commands::UploadProxy { file } => cmd::cmd_upload_proxy(&file).await,
    Commands::ApplyTemplate {
      source,
      target,
      placeholders,
      clean,
    } => cmd::cmd_apply_template(&source, &target, placeholders, clean),
  }
}
