//! Repository-backed entities and their cache keys.

use serde::{de::DeserializeOwned, Serialize};

/// File name used when an entity name yields no usable characters.
pub const FALLBACK_FILE_STEM: &str = "untitled";

/// Path sentinel marking an entity that has not been saved yet.
pub const NEW_PATH: &str = "new";

/// An entity stored as a file in a configured repository.
///
/// Entities are cached under `repo_name:file_path`.
pub trait RepoEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Singular name for logs and messages (e.g. "prompt").
  const KIND: &'static str;
  /// Collection segment used in API routes and as the repository directory.
  const COLLECTION: &'static str;
  /// Key the store persists its snapshot under.
  const STORE_NAME: &'static str;

  fn repo_name(&self) -> &str;

  fn file_path(&self) -> &str;

  /// Human-readable name used to derive a path for unsaved entities.
  fn name(&self) -> &str;

  fn set_location(&mut self, repo_name: &str, file_path: &str);

  fn cache_key(&self) -> String {
    cache_key(self.repo_name(), self.file_path())
  }
}

pub fn cache_key(repo_name: &str, file_path: &str) -> String {
  format!("{}:{}", repo_name, file_path)
}

/// Whether `file_path` asks for a path to be assigned.
pub fn needs_path(file_path: &str) -> bool {
  let trimmed = file_path.trim();
  trimmed.is_empty() || trimmed == NEW_PATH
}

/// Turn a display name into a file stem: lower-case ASCII alphanumerics with
/// every other run of characters collapsed to a single `-`.
pub fn slugify(name: &str) -> String {
  let mut slug = String::with_capacity(name.len());
  let mut pending_separator = false;

  for c in name.chars() {
    if c.is_ascii_alphanumeric() {
      if pending_separator && !slug.is_empty() {
        slug.push('-');
      }
      pending_separator = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      pending_separator = true;
    }
  }

  slug
}

/// Path for an entity saved without one: `<directory>/<slug>.yaml`.
pub fn derive_file_path(directory: &str, name: &str) -> String {
  let slug = slugify(name);
  let stem = if slug.is_empty() {
    FALLBACK_FILE_STEM
  } else {
    &slug
  };
  format!("{}/{}.yaml", directory, stem)
}
