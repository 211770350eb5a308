//! Small filesystem helpers shared across modules.

use std::fs;
use std::io;
use std::path::Path;

/// Ensure `path` exists as a directory, removing any previous contents
/// first when `clean` is set.
pub fn prepare_dir(path: &Path, clean: bool) -> io::Result<()> {
  if clean && path.exists() {
    fs::remove_dir_all(path)?;
  }
  fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn creates_missing_directory() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("a/b/c");

    prepare_dir(&target, false).unwrap();
    assert!(target.is_dir());
  }

  #[test]
  fn keeps_contents_without_clean() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("keep.txt"), "x").unwrap();

    prepare_dir(temp.path(), false).unwrap();
    assert!(temp.path().join("keep.txt").exists());
  }

  #[test]
  fn clean_empties_existing_directory() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("old.txt"), "x").unwrap();

    prepare_dir(temp.path(), true).unwrap();
    assert!(temp.path().is_dir());
    assert!(!temp.path().join("old.txt").exists());
  }
}
