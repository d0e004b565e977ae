//! High-capacity SQLite-backed storage.
//!
//! The connection lives on a dedicated worker thread. Requests are queued on an
//! unbounded channel and applied in submission order, so a read issued after a
//! write always observes it even though the write itself is never awaited.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Schema for the key-value table.
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

enum Request {
  Get {
    key: String,
    reply: oneshot::Sender<Result<Option<String>>>,
  },
  Set {
    key: String,
    value: String,
  },
  Remove {
    key: String,
  },
}

/// SQLite key-value storage with asynchronous reads and queued writes.
#[derive(Debug, Clone)]
pub struct IndexedStorage {
  tx: mpsc::UnboundedSender<Request>,
}

impl IndexedStorage {
  /// Open storage backed by the database file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::start(conn)
  }

  /// Open storage backed by a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::start(conn)
  }

  /// Default database path under the user's data directory.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("promptrepo").join("cache.db"))
  }

  fn start(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
      .name("promptrepo-indexed".to_string())
      .spawn(move || run_worker(conn, rx))
      .map_err(|e| eyre!("Failed to start storage worker: {}", e))?;

    Ok(Self { tx })
  }

  pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
    let (reply, response) = oneshot::channel();
    self
      .tx
      .send(Request::Get {
        key: key.to_string(),
        reply,
      })
      .map_err(|_| eyre!("Storage worker has stopped"))?;

    response
      .await
      .map_err(|_| eyre!("Storage worker dropped the request"))?
  }

  pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self
      .tx
      .send(Request::Set {
        key: key.to_string(),
        value: value.to_string(),
      })
      .map_err(|_| eyre!("Storage worker has stopped"))
  }

  pub fn remove_item(&self, key: &str) -> Result<()> {
    self
      .tx
      .send(Request::Remove {
        key: key.to_string(),
      })
      .map_err(|_| eyre!("Storage worker has stopped"))
  }
}

fn run_worker(conn: Connection, mut rx: mpsc::UnboundedReceiver<Request>) {
  while let Some(request) = rx.blocking_recv() {
    match request {
      Request::Get { key, reply } => {
        let result = conn
          .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
          )
          .optional()
          .map_err(|e| eyre!("Failed to read {}: {}", key, e));
        // Caller may have gone away
        let _ = reply.send(result);
      }
      Request::Set { key, value } => {
        let result = conn.execute(
          "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
           VALUES (?, ?, datetime('now'))",
          params![key, value],
        );
        if let Err(e) = result {
          warn!(key, error = %e, "failed to write to indexed storage");
        }
      }
      Request::Remove { key } => {
        if let Err(e) = conn.execute("DELETE FROM kv_store WHERE key = ?", params![key]) {
          warn!(key, error = %e, "failed to remove from indexed storage");
        }
      }
    }
  }
  debug!("indexed storage worker stopped");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let storage = IndexedStorage::open(&path).unwrap();
    storage.set_item("prompt-store", "{\"a\":1}").unwrap();
    // Reads are ordered behind the queued write
    assert_eq!(
      storage.get_item("prompt-store").await.unwrap().as_deref(),
      Some("{\"a\":1}")
    );
    drop(storage);

    let reopened = IndexedStorage::open(&path).unwrap();
    assert_eq!(
      reopened.get_item("prompt-store").await.unwrap().as_deref(),
      Some("{\"a\":1}")
    );
  }

  #[tokio::test]
  async fn test_overwrite_replaces_value() {
    let storage = IndexedStorage::open_in_memory().unwrap();
    storage.set_item("k", "1").unwrap();
    storage.set_item("k", "2").unwrap();
    assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("2"));
  }
}
