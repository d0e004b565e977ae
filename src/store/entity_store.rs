//! Cache of repository entities (prompts, evals) keyed by `repo:path`.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
  AccessGate, CacheSource, Notifier, PendingFlags, RepoProvider, SingleFlight, StateCell,
  StoreState, TaskHandle,
};
use crate::api::{EntityApi, RepoApi, ResetResponse};
use crate::entity::{cache_key, derive_file_path, needs_path, RepoEntity};
use crate::error::{StoreError, StoreResult};
use crate::freshness::{is_stale, now_ms};
use crate::hydration::{clear_snapshot, Persisted};
use crate::persist::Storage;
use crate::types::{Eval, Prompt};

/// Repository names sent per discovery request.
pub const DISCOVERY_BATCH_SIZE: usize = 20;

pub type PromptStore = RepoEntityStore<Prompt>;
pub type EvalStore = RepoEntityStore<Eval>;

#[derive(Debug, Clone)]
pub struct EntityState<E> {
  /// Cache mapping, one entry per `repo:path`
  pub entries: BTreeMap<String, E>,
  /// Entity open for viewing or editing
  pub current: Option<E>,
  /// Epoch millis of the last full discovery
  pub last_sync: Option<i64>,
  pub flags: PendingFlags,
  /// Current entity has unsaved edits
  pub has_changes: bool,
  pub error: Option<String>,
  pub has_hydrated: bool,
}

impl<E> Default for EntityState<E> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
      current: None,
      last_sync: None,
      flags: PendingFlags::default(),
      has_changes: false,
      error: None,
      has_hydrated: false,
    }
  }
}

impl<E: RepoEntity> EntityState<E> {
  fn current_key(&self) -> Option<String> {
    self.current.as_ref().map(RepoEntity::cache_key)
  }
}

/// Persisted projection of [`EntityState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot<E> {
  pub entries: BTreeMap<String, E>,
  pub last_sync: Option<i64>,
}

impl<E: RepoEntity> Persisted for EntityState<E> {
  const NAME: &'static str = E::STORE_NAME;
  const VERSION: u32 = 1;
  type Snapshot = EntitySnapshot<E>;

  fn partialize(&self) -> EntitySnapshot<E> {
    EntitySnapshot {
      entries: self.entries.clone(),
      last_sync: self.last_sync,
    }
  }

  fn restore(&mut self, snapshot: EntitySnapshot<E>) {
    self.entries = snapshot.entries;
    self.last_sync = snapshot.last_sync;
  }
}

impl<E: RepoEntity> StoreState for EntityState<E> {
  fn mark_hydrated(&mut self) {
    self.has_hydrated = true;
  }
}

/// Result of resetting a repository to its base branch.
#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome<E> {
  /// No open entity belonged to the reset repository.
  Unaffected,
  /// The open entity was re-fetched after the reset.
  Refreshed(E),
  /// The open entity no longer exists upstream; show the list instead.
  NavigateToList,
}

struct Inner<E: RepoEntity> {
  cell: StateCell<EntityState<E>>,
  api: Arc<dyn EntityApi<E>>,
  repo_api: Arc<dyn RepoApi>,
  repos: Arc<dyn RepoProvider>,
  gate: Option<Arc<dyn AccessGate>>,
  notifier: Notifier,
  ttl: Duration,
  discovery: SingleFlight<StoreResult<()>>,
  /// Bumped on invalidation so superseded discoveries are not applied
  generation: AtomicU64,
}

/// Store for one kind of repository entity.
///
/// Cheap to clone; clones share state.
pub struct RepoEntityStore<E: RepoEntity> {
  inner: Arc<Inner<E>>,
}

impl<E: RepoEntity> Clone for RepoEntityStore<E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<E: RepoEntity> RepoEntityStore<E> {
  pub fn new(
    api: Arc<dyn EntityApi<E>>,
    repo_api: Arc<dyn RepoApi>,
    repos: Arc<dyn RepoProvider>,
    storage: Storage,
    ttl: Duration,
  ) -> Self {
    Self::build(api, repo_api, repos, None, Notifier::new(), storage, ttl)
  }

  pub(crate) fn build(
    api: Arc<dyn EntityApi<E>>,
    repo_api: Arc<dyn RepoApi>,
    repos: Arc<dyn RepoProvider>,
    gate: Option<Arc<dyn AccessGate>>,
    notifier: Notifier,
    storage: Storage,
    ttl: Duration,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        cell: StateCell::new(EntityState::default(), storage),
        api,
        repo_api,
        repos,
        gate,
        notifier,
        ttl,
        discovery: SingleFlight::new(),
        generation: AtomicU64::new(0),
      }),
    }
  }

  // ==========================================================================
  // State access
  // ==========================================================================

  pub fn state(&self) -> EntityState<E> {
    self.inner.cell.snapshot()
  }

  pub fn subscribe(&self) -> watch::Receiver<EntityState<E>> {
    self.inner.cell.subscribe()
  }

  pub fn has_hydrated(&self) -> bool {
    self.inner.cell.read(|s| s.has_hydrated)
  }

  pub fn entries(&self) -> Vec<E> {
    self.inner.cell.read(|s| s.entries.values().cloned().collect())
  }

  pub fn get(&self, repo_name: &str, file_path: &str) -> Option<E> {
    let key = cache_key(repo_name, file_path);
    self.inner.cell.read(|s| s.entries.get(&key).cloned())
  }

  pub fn current(&self) -> Option<E> {
    self.inner.cell.read(|s| s.current.clone())
  }

  pub fn set_current(&self, entity: Option<E>) {
    self.inner.cell.update(|s| {
      s.current = entity;
      s.has_changes = false;
    });
  }

  /// Replace the open entity with an edited copy, without saving it.
  pub fn edit_current(&self, entity: E) {
    self.inner.cell.update(|s| {
      s.current = Some(entity);
      s.has_changes = true;
    });
  }

  // ==========================================================================
  // Actions
  // ==========================================================================

  /// Load the persisted snapshot into this store.
  pub async fn hydrate(&self) -> bool {
    let found = self.inner.cell.hydrate().await;
    debug!(store = E::STORE_NAME, found, "hydrated");
    found
  }

  /// Discover entities unless the cache is populated and fresh.
  pub async fn initialize(&self) -> StoreResult<CacheSource> {
    let (populated, last_sync) = self
      .inner
      .cell
      .read(|s| (!s.entries.is_empty(), s.last_sync));

    if populated && !is_stale(last_sync, self.inner.ttl) {
      debug!(store = E::STORE_NAME, "cache fresh, skipping discovery");
      return Ok(CacheSource::CacheFresh);
    }

    self.discover_all().await?;
    Ok(CacheSource::Network)
  }

  /// Rediscover every entity in the configured repositories, replacing the cache.
  ///
  /// Concurrent calls share a single discovery.
  pub async fn discover_all(&self) -> StoreResult<()> {
    let this = self.clone();
    self
      .inner
      .discovery
      .run(move || async move { this.run_discovery().await }.boxed())
      .await
  }

  /// Run [`Self::discover_all`] on its own task so the caller can abort it.
  pub fn spawn_discover_all(&self) -> TaskHandle<()> {
    let this = self.clone();
    TaskHandle::spawn(async move { this.discover_all().await })
  }

  async fn run_discovery(&self) -> StoreResult<()> {
    let generation = self.inner.generation.load(Ordering::SeqCst);
    self.inner.cell.update(|s| {
      s.flags.is_loading = true;
      s.error = None;
    });

    if let Some(gate) = &self.inner.gate {
      if !gate.is_authenticated() {
        debug!(store = E::STORE_NAME, "not authenticated, clearing cache");
        self.apply_for(generation, |s| {
          s.entries.clear();
          s.last_sync = None;
          s.flags.is_loading = false;
        });
        return Ok(());
      }
    }

    // Snapshot read: later config changes do not affect this run
    let repo_names = self.inner.repos.repo_names();
    if repo_names.is_empty() {
      debug!(store = E::STORE_NAME, "no configured repositories, clearing cache");
      self.apply_for(generation, |s| {
        s.entries.clear();
        s.last_sync = Some(now_ms());
        s.flags.is_loading = false;
      });
      return Ok(());
    }

    let mut discovered = Vec::new();
    for batch in repo_names.chunks(DISCOVERY_BATCH_SIZE) {
      match self.inner.api.discover(batch).await {
        Ok(entities) => discovered.extend(entities),
        Err(e) => {
          let err = StoreError::from(e);
          let message = format!("Failed to load {}s: {}", E::KIND, err);
          let applied = self.apply_for(generation, |s| {
            s.flags.is_loading = false;
            s.error = Some(message.clone());
          });
          if applied {
            warn!(store = E::STORE_NAME, error = %err, "discovery failed");
            self.inner.notifier.error(message);
          } else {
            debug!(store = E::STORE_NAME, error = %err, "superseded discovery failed");
          }
          return Err(err);
        }
      }
    }

    let entries: BTreeMap<String, E> = discovered
      .into_iter()
      .map(|entity| (entity.cache_key(), entity))
      .collect();
    let count = entries.len();

    let applied = self.apply_for(generation, |s| {
      s.entries = entries;
      s.last_sync = Some(now_ms());
      s.flags.is_loading = false;
    });

    if applied {
      info!(
        store = E::STORE_NAME,
        repos = repo_names.len(),
        count,
        "discovery complete"
      );
    } else {
      debug!(store = E::STORE_NAME, "cache invalidated during discovery, discarding result");
    }
    Ok(())
  }

  /// Apply `f` unless the cache was invalidated after the run started at
  /// `generation`. The check happens under the state lock.
  fn apply_for(&self, generation: u64, f: impl FnOnce(&mut EntityState<E>)) -> bool {
    let mut applied = false;
    self.inner.cell.update(|s| {
      if self.inner.generation.load(Ordering::SeqCst) == generation {
        f(s);
        applied = true;
      }
    });
    applied
  }

  /// Fetch one entity by key, bypassing the freshness policy, and open it.
  pub async fn fetch_by_id(&self, repo_name: &str, file_path: &str) -> StoreResult<E> {
    self.inner.cell.update(|s| {
      s.flags.is_loading = true;
      s.error = None;
    });

    match self.inner.api.get(repo_name, file_path).await {
      Ok(entity) => {
        let cached = entity.clone();
        let opened = entity.clone();
        self.inner.cell.update(|s| {
          s.entries.insert(cached.cache_key(), cached);
          s.current = Some(opened);
          s.has_changes = false;
          s.flags.is_loading = false;
        });
        Ok(entity)
      }
      Err(e) => {
        let err = StoreError::from(e);
        self.fail(
          &err,
          &format!("Failed to load {} {}:{}", E::KIND, repo_name, file_path),
          |f| f.is_loading = false,
        );
        Err(err)
      }
    }
  }

  /// Save `entity` at `file_path`, deriving a path from its name when none is given.
  ///
  /// The cache entry is keyed by the location the backend returns.
  pub async fn save(&self, repo_name: &str, file_path: &str, entity: E) -> StoreResult<E> {
    let creating = needs_path(file_path);
    let target_path = if creating {
      derive_file_path(E::COLLECTION, entity.name())
    } else {
      file_path.to_string()
    };

    let mut outgoing = entity;
    outgoing.set_location(repo_name, &target_path);
    let request_key = cache_key(repo_name, &target_path);

    self.inner.cell.update(|s| {
      if creating {
        s.flags.is_creating = true;
      } else {
        s.flags.is_updating = true;
      }
      s.error = None;
    });

    match self.inner.api.save(repo_name, &target_path, &outgoing).await {
      Ok(saved) => {
        let saved_key = saved.cache_key();
        let result = saved.clone();
        self.inner.cell.update(|s| {
          if saved_key != request_key {
            s.entries.remove(&request_key);
          }
          // The open entity is the one being saved unless it lives elsewhere
          let was_open = s.current.as_ref().map_or(true, |current| {
            needs_path(current.file_path()) || current.cache_key() == request_key
          });
          s.entries.insert(saved_key, saved.clone());
          if was_open {
            s.current = Some(saved);
          }
          s.has_changes = false;
          s.flags.is_creating = false;
          s.flags.is_updating = false;
        });
        self
          .inner
          .notifier
          .success(format!("Saved {} {}", E::KIND, result.name()));
        info!(store = E::STORE_NAME, key = %result.cache_key(), "saved");
        Ok(result)
      }
      Err(e) => {
        let err = StoreError::from(e);
        self.fail(&err, &format!("Failed to save {}", E::KIND), |f| {
          f.is_creating = false;
          f.is_updating = false;
        });
        Err(err)
      }
    }
  }

  /// Delete one entity; the cache entry survives if the request fails.
  pub async fn delete(&self, repo_name: &str, file_path: &str) -> StoreResult<()> {
    self.inner.cell.update(|s| {
      s.flags.is_deleting = true;
      s.error = None;
    });

    match self.inner.api.delete(repo_name, file_path).await {
      Ok(()) => {
        let key = cache_key(repo_name, file_path);
        self.inner.cell.update(|s| {
          s.entries.remove(&key);
          if s.current_key().as_deref() == Some(key.as_str()) {
            s.current = None;
            s.has_changes = false;
          }
          s.flags.is_deleting = false;
        });
        self
          .inner
          .notifier
          .success(format!("Deleted {} {}", E::KIND, file_path));
        Ok(())
      }
      Err(e) => {
        let err = StoreError::from(e);
        self.fail(&err, &format!("Failed to delete {}", E::KIND), |f| {
          f.is_deleting = false
        });
        Err(err)
      }
    }
  }

  /// Drop the persisted snapshot and cached entries, then rediscover.
  pub async fn invalidate(&self) -> StoreResult<()> {
    info!(store = E::STORE_NAME, "invalidating cache");
    self.inner.generation.fetch_add(1, Ordering::SeqCst);
    clear_snapshot::<EntityState<E>>(self.inner.cell.storage());
    self.inner.cell.update(|s| {
      s.entries.clear();
      s.last_sync = None;
    });

    // A discovery that started before the reset must not be joined
    let this = self.clone();
    self
      .inner
      .discovery
      .run_fresh(move || async move { this.run_discovery().await }.boxed())
      .await
  }

  /// Reset `repo_name` to its base branch and resynchronize.
  ///
  /// The reset counts as failed when either the request fails or its payload
  /// reports failure. After a confirmed reset the cache is invalidated and an
  /// open entity from that repository is re-fetched.
  pub async fn get_latest_from_base_branch(&self, repo_name: &str) -> StoreResult<ResetOutcome<E>> {
    let result = self
      .inner
      .repo_api
      .reset_to_base_branch(repo_name)
      .await
      .and_then(ResetResponse::into_result);

    let data = match result {
      Ok(data) => data,
      Err(e) => {
        let err = StoreError::from(e);
        self.fail(
          &err,
          &format!("Failed to get latest from base branch for {}", repo_name),
          |_| {},
        );
        return Err(err);
      }
    };

    info!(repo = repo_name, "reset to base branch");
    self.inner.notifier.success(
      data
        .message
        .unwrap_or_else(|| format!("{} is up to date with its base branch", repo_name)),
    );

    if let Err(e) = self.invalidate().await {
      warn!(repo = repo_name, error = %e, "resync after reset failed");
    }

    let open = self
      .current()
      .filter(|entity| entity.repo_name() == repo_name);
    let Some(open) = open else {
      return Ok(ResetOutcome::Unaffected);
    };

    match self.fetch_by_id(repo_name, open.file_path()).await {
      Ok(entity) => Ok(ResetOutcome::Refreshed(entity)),
      Err(e) => {
        warn!(key = %open.cache_key(), error = %e, "open entity gone after reset");
        self.set_current(None);
        Ok(ResetOutcome::NavigateToList)
      }
    }
  }

  fn fail(&self, err: &StoreError, context: &str, clear: impl FnOnce(&mut PendingFlags)) {
    let message = format!("{}: {}", context, err);
    warn!(store = E::STORE_NAME, error = %err, "{}", context);
    self.inner.cell.update(|s| {
      clear(&mut s.flags);
      s.error = Some(message.clone());
    });
    self.inner.notifier.error(message);
  }
}
