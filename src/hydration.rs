//! Hydration and partialize policy for persisted store state.
//!
//! A store never persists its whole state. It projects a versioned subset
//! (`partialize`) that is written as `{ "state": ..., "version": N }` under the
//! store's name, and merged back (`restore`) when a new store instance hydrates.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::persist::Storage;

/// Store state that persists a projection of itself.
pub trait Persisted {
  /// Storage key, e.g. `prompt-store`.
  const NAME: &'static str;
  /// Current snapshot schema version.
  const VERSION: u32;

  type Snapshot: Serialize + DeserializeOwned;

  /// Project the fields that persist.
  fn partialize(&self) -> Self::Snapshot;

  /// Merge a hydrated snapshot into freshly constructed state.
  fn restore(&mut self, snapshot: Self::Snapshot);

  /// Upgrade a snapshot written by another schema version.
  ///
  /// Returning `None` discards the snapshot.
  fn migrate(state: Value, _from_version: u32) -> Option<Value> {
    Some(state)
  }
}

/// On-storage layout of a persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
  pub state: T,
  pub version: u32,
}

/// Load, migrate and decode the snapshot for `P`. Any failure reads as `None`.
pub async fn load_snapshot<P: Persisted>(storage: &Storage) -> Option<P::Snapshot> {
  let envelope: Envelope<Value> = storage.get(P::NAME).await?;

  let state = if envelope.version == P::VERSION {
    envelope.state
  } else {
    debug!(
      store = P::NAME,
      from = envelope.version,
      to = P::VERSION,
      "migrating persisted snapshot"
    );
    P::migrate(envelope.state, envelope.version)?
  };

  match serde_json::from_value(state) {
    Ok(snapshot) => Some(snapshot),
    Err(e) => {
      warn!(store = P::NAME, error = %e, "discarding incompatible persisted snapshot");
      None
    }
  }
}

/// Write the current projection of `state`.
pub fn save_snapshot<P: Persisted>(storage: &Storage, state: &P) {
  let envelope = Envelope {
    state: state.partialize(),
    version: P::VERSION,
  };
  storage.set(P::NAME, &envelope);
}

/// Drop the persisted snapshot for `P`.
pub fn clear_snapshot<P: Persisted>(storage: &Storage) {
  storage.remove(P::NAME);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::persist::SessionStorage;

  #[derive(Debug, Default, PartialEq)]
  struct Counter {
    count: u32,
    busy: bool,
  }

  #[derive(Serialize, Deserialize)]
  struct CounterSnapshot {
    count: u32,
  }

  impl Persisted for Counter {
    const NAME: &'static str = "counter-store";
    const VERSION: u32 = 2;
    type Snapshot = CounterSnapshot;

    fn partialize(&self) -> CounterSnapshot {
      CounterSnapshot { count: self.count }
    }

    fn restore(&mut self, snapshot: CounterSnapshot) {
      self.count = snapshot.count;
    }

    fn migrate(mut state: Value, from_version: u32) -> Option<Value> {
      // v1 called the field "total"
      if from_version == 1 {
        let total = state.get("total")?.clone();
        state = serde_json::json!({ "count": total });
      }
      Some(state)
    }
  }

  #[tokio::test]
  async fn test_round_trip_excludes_transient_fields() {
    let storage = Storage::Session(SessionStorage::new());
    save_snapshot(&storage, &Counter { count: 7, busy: true });

    let mut fresh = Counter::default();
    fresh.restore(load_snapshot::<Counter>(&storage).await.unwrap());
    assert_eq!(fresh, Counter { count: 7, busy: false });
  }

  #[tokio::test]
  async fn test_envelope_layout() {
    let storage = Storage::Session(SessionStorage::new());
    save_snapshot(&storage, &Counter { count: 1, busy: false });

    let raw: Value = storage.get("counter-store").await.unwrap();
    assert_eq!(raw, serde_json::json!({ "state": { "count": 1 }, "version": 2 }));
  }

  #[tokio::test]
  async fn test_migrates_older_version() {
    let storage = Storage::Session(SessionStorage::new());
    storage.set(
      "counter-store",
      &serde_json::json!({ "state": { "total": 4 }, "version": 1 }),
    );

    let snapshot = load_snapshot::<Counter>(&storage).await.unwrap();
    assert_eq!(snapshot.count, 4);
  }

  #[tokio::test]
  async fn test_cleared_snapshot_loads_nothing() {
    let storage = Storage::Session(SessionStorage::new());
    save_snapshot(&storage, &Counter { count: 1, busy: false });
    clear_snapshot::<Counter>(&storage);
    assert!(load_snapshot::<Counter>(&storage).await.is_none());
  }
}
