//! Client-side stores with persisted, TTL-checked caches.
//!
//! Each store owns its state exclusively and exposes async actions that:
//! - skip the network while the hydrated cache is still fresh
//! - replace (never merge) the cache mapping on a full discovery
//! - keep the last known-good data when a request fails
//! - write a partialized snapshot back to storage after every change
//!
//! Cross-store dependencies are injected as [`RepoProvider`] and [`AccessGate`]
//! and read as point-in-time snapshots.

mod auth_store;
mod config_store;
mod entity_store;
mod notice;
mod single_flight;
mod task;

pub use auth_store::{AuthSnapshot, AuthState, AuthStore};
pub use config_store::{ConfigSnapshot, ConfigState, ConfigStore};
pub use entity_store::{
  EntitySnapshot, EntityState, EvalStore, PromptStore, RepoEntityStore, ResetOutcome,
  DISCOVERY_BATCH_SIZE,
};
pub use notice::{Notice, NoticeLevel, Notifier};
pub use single_flight::SingleFlight;
pub use task::TaskHandle;

use tokio::sync::watch;

use crate::hydration::{load_snapshot, save_snapshot, Persisted};
use crate::persist::Storage;

/// Supplies the configured repository names, read once per call.
pub trait RepoProvider: Send + Sync {
  fn repo_names(&self) -> Vec<String>;
}

/// Reports whether remote calls that need a session may run.
pub trait AccessGate: Send + Sync {
  fn is_authenticated(&self) -> bool;
}

/// Where the data returned by a store action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
}

/// Flags that gate UI affordances. Never used to deduplicate requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingFlags {
  pub is_loading: bool,
  pub is_creating: bool,
  pub is_updating: bool,
  pub is_deleting: bool,
}

/// State held by a store.
pub trait StoreState: Persisted + Clone + Send + Sync + 'static {
  fn mark_hydrated(&mut self);
}

/// Observable state container.
///
/// Every update applies a complete mutation under the channel lock, so
/// subscribers only ever see whole states. The persisted projection is
/// written after each update.
pub struct StateCell<S: StoreState> {
  tx: watch::Sender<S>,
  storage: Storage,
}

impl<S: StoreState> StateCell<S> {
  pub fn new(initial: S, storage: Storage) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx, storage }
  }

  /// Clone of the current state.
  pub fn snapshot(&self) -> S {
    self.tx.borrow().clone()
  }

  /// Read from the current state without cloning all of it.
  pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
    f(&self.tx.borrow())
  }

  pub fn subscribe(&self) -> watch::Receiver<S> {
    self.tx.subscribe()
  }

  /// Apply `f` atomically and persist the result.
  pub fn update(&self, f: impl FnOnce(&mut S)) {
    self.tx.send_modify(f);
    self.persist();
  }

  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  fn persist(&self) {
    let state = self.tx.borrow();
    save_snapshot(&self.storage, &*state);
  }

  /// Merge the persisted snapshot, if any, and mark the state hydrated.
  ///
  /// Returns whether a snapshot was found.
  pub async fn hydrate(&self) -> bool {
    let snapshot = load_snapshot::<S>(&self.storage).await;
    let found = snapshot.is_some();
    self.tx.send_modify(|state| {
      if let Some(snapshot) = snapshot {
        state.restore(snapshot);
      }
      state.mark_hydrated();
    });
    found
  }
}
