//! Zip packaging for proxy directories.
//!
//! Archives always carry the canonical layout: a single `APIProxy/` root
//! folder holding the proxy files, whatever the local directory is called.
//! Packaging a template first materializes the placeholders into a scratch
//! directory that lives exactly as long as the archive is being produced.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::consts::PROXY_FOLDER;
use crate::layout::canonical_root;
use crate::template::{self, TemplateError};

/// Errors that can occur while packaging or unpacking a proxy archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  /// The directory to package does not exist.
  #[error("proxy directory not found: {0}")]
  MissingDirectory(PathBuf),

  /// Materializing the template before packaging failed.
  #[error(transparent)]
  Template(#[from] TemplateError),

  /// The zip stream could not be written.
  #[error("unable to build proxy archive")]
  Pack(#[source] ZipError),

  /// The zip stream could not be read.
  #[error("unable to extract proxy archive")]
  Unpack(#[source] ZipError),

  /// An archive entry would escape the target directory.
  #[error("archive entry has an unsafe path: {0}")]
  UnsafeEntry(String),

  /// A file or directory could not be accessed.
  #[error("unable to access '{path}'")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Options for packaging a proxy directory.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
  /// Treat the directory as a template and apply placeholders first.
  pub templated: bool,

  /// Placeholder values, only consulted when `templated` is set.
  pub placeholders: BTreeMap<String, String>,
}

/// Package a proxy directory into an in-memory zip archive.
///
/// The directory is normalized into the canonical layout first. For a
/// templated package the placeholders are materialized into a private
/// scratch directory which is removed once the archive bytes are complete,
/// including on the error path.
pub fn package_proxy(directory: &Path, options: &PackageOptions) -> Result<Vec<u8>, ArchiveError> {
  let root = canonical_root(directory);
  if !root.is_dir() {
    return Err(ArchiveError::MissingDirectory(root));
  }

  if options.templated {
    let scratch = tempfile::tempdir().map_err(|e| ArchiveError::Io {
      path: std::env::temp_dir(),
      source: e,
    })?;
    let materialized = scratch.path().join(PROXY_FOLDER);
    template::apply_template(&root, &materialized, &options.placeholders)?;
    zip_tree(&materialized)
  } else {
    zip_tree(&root)
  }
}

/// Package a proxy directory into a zip file, creating parent directories
/// of `target` as needed.
pub fn package_proxy_to_file(
  directory: &Path,
  target: &Path,
  options: &PackageOptions,
) -> Result<(), ArchiveError> {
  if let Some(parent) = target.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent).map_err(|e| ArchiveError::Io {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }
  }

  let bytes = package_proxy(directory, options)?;
  fs::write(target, bytes).map_err(|e| ArchiveError::Io {
    path: target.to_path_buf(),
    source: e,
  })?;
  debug!(target = %target.display(), "wrote proxy archive");
  Ok(())
}

/// Extract a proxy archive into `target`, creating it if absent. Entry
/// paths are preserved, so the canonical `APIProxy/` folder ends up inside
/// `target`.
pub fn unpack_archive(bytes: &[u8], target: &Path) -> Result<(), ArchiveError> {
  fs::create_dir_all(target).map_err(|e| ArchiveError::Io {
    path: target.to_path_buf(),
    source: e,
  })?;

  let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::Unpack)?;
  for i in 0..archive.len() {
    let mut file = archive.by_index(i).map_err(ArchiveError::Unpack)?;
    let Some(rel) = file.enclosed_name() else {
      return Err(ArchiveError::UnsafeEntry(file.name().to_string()));
    };
    let dest = target.join(&rel);

    if file.is_dir() {
      fs::create_dir_all(&dest).map_err(|e| ArchiveError::Io {
        path: dest.clone(),
        source: e,
      })?;
      continue;
    }

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| ArchiveError::Io {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }
    let mut out = File::create(&dest).map_err(|e| ArchiveError::Io {
      path: dest.clone(),
      source: e,
    })?;
    io::copy(&mut file, &mut out).map_err(|e| ArchiveError::Io {
      path: dest.clone(),
      source: e,
    })?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest, fs::Permissions::from_mode(mode)).map_err(|e| ArchiveError::Io {
          path: dest.clone(),
          source: e,
        })?;
      }
    }
  }

  debug!(target = %target.display(), "unpacked proxy archive");
  Ok(())
}

/// Zip the contents of `root` under the canonical `APIProxy/` prefix.
fn zip_tree(root: &Path) -> Result<Vec<u8>, ArchiveError> {
  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  let zip_options = SimpleFileOptions::default();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|e| ArchiveError::Io {
      path: root.to_path_buf(),
      source: io::Error::from(e),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(root) else {
      continue;
    };

    // Archive paths always use forward slashes.
    let rel = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    writer
      .start_file(format!("{PROXY_FOLDER}/{rel}"), zip_options)
      .map_err(ArchiveError::Pack)?;

    let mut file = File::open(entry.path()).map_err(|e| ArchiveError::Io {
      path: entry.path().to_path_buf(),
      source: e,
    })?;
    io::copy(&mut file, &mut writer).map_err(|e| ArchiveError::Io {
      path: entry.path().to_path_buf(),
      source: e,
    })?;
  }

  let cursor = writer.finish().map_err(ArchiveError::Pack)?;
  Ok(cursor.into_inner())
}
