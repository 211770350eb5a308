//! Bidirectional placeholder substitution across a directory tree.
//!
//! A template is an ordinary proxy directory whose files contain `{{name}}`
//! tokens. Applying a template replaces every token with its configured
//! value; extracting a template is the inverse and replaces literal values
//! with their tokens. Both directions are expressed as an ordered list of
//! literal find/replace [`Rule`]s run over every text file under the target
//! root.
//!
//! # Ordering
//!
//! Apply-direction rules can run in any order: one rule's token can never
//! appear in another rule's replacement under normal use. Extract-direction
//! rules MUST run longest value first, otherwise a value that is a substring
//! of a longer one (`"host"` inside `"myhost.example.com"`) would steal the
//! replacement and corrupt the output. [`extract_rules`] performs that sort
//! explicitly; equal-length distinct values cannot contain one another, so
//! ties need no further ordering.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::util::prepare_dir;

/// Errors that can occur while applying or extracting a template.
#[derive(Debug, Error)]
pub enum TemplateError {
  /// Failed to copy the source tree into the target directory.
  #[error("unable to copy template tree from '{source_dir}'")]
  Copy {
    source_dir: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to prepare the target directory.
  #[error("unable to prepare target directory '{path}'")]
  Prepare {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to read or rewrite a file during substitution.
  #[error("unable to rewrite '{path}'")]
  Rewrite {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to walk the target tree.
  #[error("unable to walk template tree at '{path}'")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

/// A single literal find/replace rule applied to every file under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
  pub find: String,
  pub replace: String,
}

/// Options for the standalone template operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateOptions {
  /// Remove any previous contents of the target directory first.
  pub clean: bool,
}

/// Wrap a placeholder name in its `{{...}}` token form.
fn token(name: &str) -> String {
  format!("{{{{{name}}}}}")
}

/// Build the rule list for applying a template (token -> value).
pub fn apply_rules(placeholders: &BTreeMap<String, String>) -> Vec<Rule> {
  placeholders
    .iter()
    .map(|(name, value)| Rule {
      find: token(name),
      replace: value.clone(),
    })
    .collect()
}

/// Build the rule list for extracting a template (value -> token), sorted
/// longest value first.
pub fn extract_rules(placeholders: &BTreeMap<String, String>) -> Vec<Rule> {
  let mut rules: Vec<Rule> = placeholders
    .iter()
    .map(|(name, value)| Rule {
      find: value.clone(),
      replace: token(name),
    })
    .collect();
  rules.sort_by(|a, b| b.find.len().cmp(&a.find.len()));
  rules
}

/// Apply a template: copy `source` into `target` (unless they are the same
/// path, in which case files are rewritten in place) and replace every
/// `{{name}}` token with its value.
pub fn apply_template(
  source: &Path,
  target: &Path,
  placeholders: &BTreeMap<String, String>,
) -> Result<(), TemplateError> {
  copy_and_replace(source, target, &apply_rules(placeholders))?;
  debug!(source = %source.display(), "applied template");
  Ok(())
}

/// Extract a template: copy `source` into `target` (unless they are the
/// same path) and replace every literal value with its `{{name}}` token.
pub fn extract_template(
  source: &Path,
  target: &Path,
  placeholders: &BTreeMap<String, String>,
) -> Result<(), TemplateError> {
  copy_and_replace(source, target, &extract_rules(placeholders))?;
  debug!(source = %source.display(), "extracted template");
  Ok(())
}

/// Apply a template into a prepared target directory.
pub fn apply_template_dir(
  source: &Path,
  target: &Path,
  placeholders: &BTreeMap<String, String>,
  options: TemplateOptions,
) -> Result<(), TemplateError> {
  prepare_dir(target, options.clean).map_err(|e| TemplateError::Prepare {
    path: target.to_path_buf(),
    source: e,
  })?;
  apply_template(source, target, placeholders)
}

/// Extract a template into a prepared target directory. The target is never
/// cleaned when it is also the source.
pub fn extract_template_dir(
  source: &Path,
  target: &Path,
  placeholders: &BTreeMap<String, String>,
  options: TemplateOptions,
) -> Result<(), TemplateError> {
  let clean = options.clean && source != target;
  prepare_dir(target, clean).map_err(|e| TemplateError::Prepare {
    path: target.to_path_buf(),
    source: e,
  })?;
  extract_template(source, target, placeholders)
}

/// Copy the source tree and run the ordered rule list over every file under
/// `target`. When `source` and `target` are the same path no copy occurs.
pub fn copy_and_replace(source: &Path, target: &Path, rules: &[Rule]) -> Result<(), TemplateError> {
  if source != target {
    copy_tree(source, target).map_err(|e| TemplateError::Copy {
      source_dir: source.to_path_buf(),
      source: e,
    })?;
  }
  replace_in_tree(target, rules)
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
  for entry in WalkDir::new(source) {
    let entry = entry.map_err(io::Error::from)?;
    let rel = entry.path().strip_prefix(source).map_err(io::Error::other)?;
    let dest = target.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest)?;
    } else {
      if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &dest)?;
    }
  }
  Ok(())
}

fn replace_in_tree(root: &Path, rules: &[Rule]) -> Result<(), TemplateError> {
  if rules.is_empty() {
    return Ok(());
  }

  for entry in WalkDir::new(root) {
    let entry = entry.map_err(|e| TemplateError::Walk {
      path: root.to_path_buf(),
      source: e,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    replace_in_file(entry.path(), rules)?;
  }
  Ok(())
}

fn replace_in_file(path: &Path, rules: &[Rule]) -> Result<(), TemplateError> {
  let bytes = fs::read(path).map_err(|e| TemplateError::Rewrite {
    path: path.to_path_buf(),
    source: e,
  })?;

  // Files that are not valid UTF-8 carry no placeholder text.
  let Ok(text) = String::from_utf8(bytes) else {
    trace!(path = %path.display(), "skipping non-text file");
    return Ok(());
  };

  let mut replaced = text;
  let mut changed = false;
  for rule in rules {
    if replaced.contains(&rule.find) {
      replaced = replaced.replace(&rule.find, &rule.replace);
      changed = true;
    }
  }

  if changed {
    fs::write(path, replaced).map_err(|e| TemplateError::Rewrite {
      path: path.to_path_buf(),
      source: e,
    })?;
  }
  Ok(())
}
