//! Key-value persistence adapter over the storage media a store can hydrate from.
//!
//! Every backend offers the same logical contract (`get`/`set`/`remove` of JSON
//! values under a string key). Failures never reach the caller: they are logged
//! and the adapter behaves as if nothing was stored.
//!
//! - [`SessionStorage`]: process-scoped memory, gone when the process exits
//! - [`LocalStorage`]: one JSON file per key, survives restarts
//! - [`IndexedStorage`]: SQLite table behind a worker thread for large data sets;
//!   reads complete asynchronously, writes are queued fire-and-forget

mod indexed;
mod local;
mod session;

pub use indexed::IndexedStorage;
pub use local::LocalStorage;
pub use session::SessionStorage;

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

/// Synchronous raw key-value storage.
pub trait KeyValueStore: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;
  fn set_item(&self, key: &str, value: &str) -> Result<()>;
  fn remove_item(&self, key: &str) -> Result<()>;
}

/// Storage medium a store persists its snapshot to.
#[derive(Clone)]
pub enum Storage {
  Session(SessionStorage),
  Local(LocalStorage),
  Indexed(IndexedStorage),
  /// No storage available at all; every operation is a logged no-op.
  Unavailable,
}

impl Storage {
  pub fn kind(&self) -> &'static str {
    match self {
      Storage::Session(_) => "session",
      Storage::Local(_) => "local",
      Storage::Indexed(_) => "indexed",
      Storage::Unavailable => "unavailable",
    }
  }

  /// Read the raw string stored under `key`.
  pub async fn get_raw(&self, key: &str) -> Option<String> {
    let result = match self {
      Storage::Session(s) => s.get_item(key),
      Storage::Local(s) => s.get_item(key),
      Storage::Indexed(s) => s.get_item(key).await,
      Storage::Unavailable => {
        warn!(key, "storage unavailable, treating as empty");
        return None;
      }
    };

    result.unwrap_or_else(|e| {
      warn!(key, backend = self.kind(), error = %e, "failed to read from storage");
      None
    })
  }

  /// Read and decode the JSON value stored under `key`.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = self.get_raw(key).await?;
    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, backend = self.kind(), error = %e, "discarding undecodable stored value");
        None
      }
    }
  }

  /// Encode `value` as JSON and store it under `key`.
  ///
  /// Never blocks on the indexed backend: the write is queued.
  pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "failed to serialize value for storage");
        return;
      }
    };

    let result = match self {
      Storage::Session(s) => s.set_item(key, &raw),
      Storage::Local(s) => s.set_item(key, &raw),
      Storage::Indexed(s) => s.set_item(key, &raw),
      Storage::Unavailable => {
        warn!(key, "storage unavailable, dropping write");
        return;
      }
    };

    if let Err(e) = result {
      warn!(key, backend = self.kind(), error = %e, "failed to write to storage");
    }
  }

  /// Remove whatever is stored under `key`.
  pub fn remove(&self, key: &str) {
    let result = match self {
      Storage::Session(s) => s.remove_item(key),
      Storage::Local(s) => s.remove_item(key),
      Storage::Indexed(s) => s.remove_item(key),
      Storage::Unavailable => {
        warn!(key, "storage unavailable, nothing to remove");
        return;
      }
    };

    if let Err(e) = result {
      warn!(key, backend = self.kind(), error = %e, "failed to remove from storage");
    }
  }
}
