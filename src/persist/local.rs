use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};

use super::KeyValueStore;

/// Durable storage keeping one `<key>.json` file per key in a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
  dir: PathBuf,
}

impl LocalStorage {
  /// Open local storage rooted at `dir`, creating it if needed.
  pub fn open(dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create storage directory {}: {}", dir.display(), e))?;

    Ok(Self {
      dir: dir.to_path_buf(),
    })
  }

  fn path_for(&self, key: &str) -> PathBuf {
    // Keys are store names; keep file names portable regardless
    let file: String = key
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
          c
        } else {
          '_'
        }
      })
      .collect();
    self.dir.join(format!("{}.json", file))
  }
}

impl KeyValueStore for LocalStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let path = self.path_for(key);
    match std::fs::read_to_string(&path) {
      Ok(contents) => Ok(Some(contents)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(eyre!("Failed to read {}: {}", path.display(), e)),
    }
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let path = self.path_for(key);
    let tmp = path.with_extension("json.tmp");

    std::fs::write(&tmp, value).map_err(|e| eyre!("Failed to write {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &path)
      .map_err(|e| eyre!("Failed to replace {}: {}", path.display(), e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let path = self.path_for(key);
    match std::fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove {}: {}", path.display(), e)),
    }
  }
}
