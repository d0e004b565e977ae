//! Backend configuration: hosting type, repositories and LLM providers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{CacheSource, Notifier, PendingFlags, RepoProvider, StateCell, StoreState};
use crate::api::ConfigApi;
use crate::error::{StoreError, StoreResult};
use crate::freshness::{is_stale, now_ms};
use crate::hydration::Persisted;
use crate::persist::Storage;
use crate::types::{HostingType, LlmConfig, RepoConfig};

#[derive(Debug, Clone, Default)]
pub struct ConfigState {
  /// `None` until the backend has been asked
  pub hosting_type: Option<HostingType>,
  pub repo_configs: Vec<RepoConfig>,
  pub llm_configs: Vec<LlmConfig>,
  pub last_sync: Option<i64>,
  pub flags: PendingFlags,
  pub error: Option<String>,
  pub has_hydrated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
  pub hosting_type: Option<HostingType>,
  pub repo_configs: Vec<RepoConfig>,
  pub llm_configs: Vec<LlmConfig>,
  pub last_sync: Option<i64>,
}

impl Persisted for ConfigState {
  const NAME: &'static str = "config-store";
  const VERSION: u32 = 1;
  type Snapshot = ConfigSnapshot;

  fn partialize(&self) -> ConfigSnapshot {
    ConfigSnapshot {
      hosting_type: self.hosting_type,
      repo_configs: self.repo_configs.clone(),
      llm_configs: self.llm_configs.clone(),
      last_sync: self.last_sync,
    }
  }

  fn restore(&mut self, snapshot: ConfigSnapshot) {
    self.hosting_type = snapshot.hosting_type;
    self.repo_configs = snapshot.repo_configs;
    self.llm_configs = snapshot.llm_configs;
    self.last_sync = snapshot.last_sync;
  }
}

impl StoreState for ConfigState {
  fn mark_hydrated(&mut self) {
    self.has_hydrated = true;
  }
}

/// Store for backend configuration.
#[derive(Clone)]
pub struct ConfigStore {
  cell: Arc<StateCell<ConfigState>>,
  api: Arc<dyn ConfigApi>,
  notifier: Notifier,
  ttl: Duration,
}

impl ConfigStore {
  pub fn new(api: Arc<dyn ConfigApi>, storage: Storage, ttl: Duration) -> Self {
    Self::build(api, Notifier::new(), storage, ttl)
  }

  pub(crate) fn build(
    api: Arc<dyn ConfigApi>,
    notifier: Notifier,
    storage: Storage,
    ttl: Duration,
  ) -> Self {
    Self {
      cell: Arc::new(StateCell::new(ConfigState::default(), storage)),
      api,
      notifier,
      ttl,
    }
  }

  pub fn state(&self) -> ConfigState {
    self.cell.snapshot()
  }

  pub fn subscribe(&self) -> watch::Receiver<ConfigState> {
    self.cell.subscribe()
  }

  pub fn has_hydrated(&self) -> bool {
    self.cell.read(|s| s.has_hydrated)
  }

  pub fn hosting_type(&self) -> Option<HostingType> {
    self.cell.read(|s| s.hosting_type)
  }

  pub fn repo_configs(&self) -> Vec<RepoConfig> {
    self.cell.read(|s| s.repo_configs.clone())
  }

  pub async fn hydrate(&self) -> bool {
    let found = self.cell.hydrate().await;
    debug!(store = ConfigState::NAME, found, "hydrated");
    found
  }

  /// Fetch the configuration unless the hydrated copy is still fresh.
  pub async fn initialize(&self) -> StoreResult<CacheSource> {
    let (known, last_sync) = self
      .cell
      .read(|s| (s.hosting_type.is_some(), s.last_sync));

    if known && !is_stale(last_sync, self.ttl) {
      debug!(store = ConfigState::NAME, "cache fresh, skipping fetch");
      return Ok(CacheSource::CacheFresh);
    }

    self.fetch_config().await?;
    Ok(CacheSource::Network)
  }

  /// Replace the whole configuration with the backend's.
  pub async fn fetch_config(&self) -> StoreResult<()> {
    self.cell.update(|s| {
      s.flags.is_loading = true;
      s.error = None;
    });

    match self.api.get_config().await {
      Ok(config) => {
        info!(
          hosting = ?config.hosting_type,
          repos = config.repo_configs.len(),
          llms = config.llm_configs.len(),
          "configuration loaded"
        );
        self.cell.update(|s| {
          s.hosting_type = Some(config.hosting_type);
          s.repo_configs = config.repo_configs;
          s.llm_configs = config.llm_configs;
          s.last_sync = Some(now_ms());
          s.flags.is_loading = false;
        });
        Ok(())
      }
      Err(e) => {
        let err = StoreError::from(e);
        self.fail(&err, "Failed to load configuration", |f| f.is_loading = false);
        Err(err)
      }
    }
  }

  /// Add or replace a repository configuration.
  ///
  /// The change is visible immediately and rolled back if the backend rejects it.
  pub async fn add_repo_config(&self, config: RepoConfig) -> StoreResult<RepoConfig> {
    let name = config.repo_name.clone();
    let previous = self.cell.read(|s| find_repo(&s.repo_configs, &name).cloned());

    let optimistic = config.clone();
    self.cell.update(|s| {
      upsert_repo(&mut s.repo_configs, optimistic);
      s.flags.is_creating = true;
      s.error = None;
    });

    match self.api.save_repo_config(&config).await {
      Ok(saved) => {
        let result = saved.clone();
        self.cell.update(|s| {
          // Backend may normalize the name
          match s.repo_configs.iter_mut().find(|r| r.repo_name == name) {
            Some(existing) => *existing = saved,
            None => upsert_repo(&mut s.repo_configs, saved),
          }
          s.flags.is_creating = false;
        });
        self
          .notifier
          .success(format!("Repository {} configured", result.repo_name));
        Ok(result)
      }
      Err(e) => {
        self.cell.update(|s| match previous {
          Some(previous) => upsert_repo(&mut s.repo_configs, previous),
          None => s.repo_configs.retain(|r| r.repo_name != name),
        });
        let err = StoreError::from(e);
        self.fail(&err, &format!("Failed to configure {}", name), |f| {
          f.is_creating = false
        });
        Err(err)
      }
    }
  }

  /// Remove a repository configuration, restoring it if the backend refuses.
  pub async fn remove_repo_config(&self, repo_name: &str) -> StoreResult<()> {
    let removed = self.cell.read(|s| {
      s.repo_configs
        .iter()
        .position(|r| r.repo_name == repo_name)
        .map(|index| (index, s.repo_configs[index].clone()))
    });

    self.cell.update(|s| {
      s.repo_configs.retain(|r| r.repo_name != repo_name);
      s.flags.is_deleting = true;
      s.error = None;
    });

    match self.api.delete_repo_config(repo_name).await {
      Ok(()) => {
        self.cell.update(|s| s.flags.is_deleting = false);
        Ok(())
      }
      Err(e) => {
        if let Some((index, config)) = removed {
          self.cell.update(|s| {
            if find_repo(&s.repo_configs, repo_name).is_none() {
              let index = index.min(s.repo_configs.len());
              s.repo_configs.insert(index, config);
            }
          });
        }
        let err = StoreError::from(e);
        self.fail(&err, &format!("Failed to remove {}", repo_name), |f| {
          f.is_deleting = false
        });
        Err(err)
      }
    }
  }

  /// Add or replace an LLM provider configuration, rolled back on failure.
  pub async fn save_llm_config(&self, config: LlmConfig) -> StoreResult<LlmConfig> {
    let id = config.id.clone();
    let previous = self
      .cell
      .read(|s| s.llm_configs.iter().find(|c| c.id == id).cloned());

    let optimistic = config.clone();
    self.cell.update(|s| {
      upsert_llm(&mut s.llm_configs, optimistic);
      s.flags.is_updating = true;
      s.error = None;
    });

    match self.api.save_llm_config(&config).await {
      Ok(saved) => {
        let result = saved.clone();
        self.cell.update(|s| {
          upsert_llm(&mut s.llm_configs, saved);
          s.flags.is_updating = false;
        });
        Ok(result)
      }
      Err(e) => {
        self.cell.update(|s| match previous {
          Some(previous) => upsert_llm(&mut s.llm_configs, previous),
          None => s.llm_configs.retain(|c| c.id != id),
        });
        let err = StoreError::from(e);
        self.fail(&err, "Failed to save LLM configuration", |f| {
          f.is_updating = false
        });
        Err(err)
      }
    }
  }

  fn fail(&self, err: &StoreError, context: &str, clear: impl FnOnce(&mut PendingFlags)) {
    let message = format!("{}: {}", context, err);
    warn!(store = ConfigState::NAME, error = %err, "{}", context);
    self.cell.update(|s| {
      clear(&mut s.flags);
      s.error = Some(message.clone());
    });
    self.notifier.error(message);
  }
}

impl RepoProvider for ConfigStore {
  fn repo_names(&self) -> Vec<String> {
    self
      .cell
      .read(|s| s.repo_configs.iter().map(|r| r.repo_name.clone()).collect())
  }
}

fn find_repo<'a>(configs: &'a [RepoConfig], name: &str) -> Option<&'a RepoConfig> {
  configs.iter().find(|r| r.repo_name == name)
}

fn upsert_repo(configs: &mut Vec<RepoConfig>, config: RepoConfig) {
  match configs.iter_mut().find(|r| r.repo_name == config.repo_name) {
    Some(existing) => *existing = config,
    None => configs.push(config),
  }
}

fn upsert_llm(configs: &mut Vec<LlmConfig>, config: LlmConfig) {
  match configs.iter_mut().find(|c| c.id == config.id) {
    Some(existing) => *existing = config,
    None => configs.push(config),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::AppConfig;
  use crate::error::{ApiError, ApiResult};
  use crate::persist::{LocalStorage, SessionStorage};
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  #[derive(Default)]
  struct FakeConfigApi {
    config: Mutex<AppConfig>,
    fail: Mutex<bool>,
    get_calls: AtomicUsize,
  }

  impl FakeConfigApi {
    fn serving(config: AppConfig) -> Arc<Self> {
      let api = Self::default();
      *api.config.lock().unwrap() = config;
      Arc::new(api)
    }

    fn check(&self) -> ApiResult<()> {
      if *self.fail.lock().unwrap() {
        return Err(ApiError::Status {
          status: 500,
          message: "boom".to_string(),
        });
      }
      Ok(())
    }
  }

  #[async_trait]
  impl ConfigApi for FakeConfigApi {
    async fn get_config(&self) -> ApiResult<AppConfig> {
      self.get_calls.fetch_add(1, Ordering::SeqCst);
      self.check()?;
      Ok(self.config.lock().unwrap().clone())
    }

    async fn save_repo_config(&self, config: &RepoConfig) -> ApiResult<RepoConfig> {
      self.check()?;
      let mut saved = config.clone();
      if saved.base_branch.is_empty() {
        saved.base_branch = "main".to_string();
      }
      Ok(saved)
    }

    async fn delete_repo_config(&self, _repo_name: &str) -> ApiResult<()> {
      self.check()
    }

    async fn save_llm_config(&self, config: &LlmConfig) -> ApiResult<LlmConfig> {
      self.check()?;
      Ok(config.clone())
    }
  }

  fn repo(name: &str) -> RepoConfig {
    RepoConfig {
      repo_name: name.to_string(),
      base_branch: "main".to_string(),
      current_branch: "main".to_string(),
    }
  }

  fn served() -> AppConfig {
    AppConfig {
      hosting_type: HostingType::Organization,
      repo_configs: vec![repo("acme/prompts"), repo("acme/evals")],
      llm_configs: vec![],
    }
  }

  fn store(api: Arc<FakeConfigApi>) -> ConfigStore {
    ConfigStore::new(
      api,
      Storage::Session(SessionStorage::new()),
      Duration::from_secs(300),
    )
  }

  #[tokio::test]
  async fn test_fetch_config_and_repo_names() {
    let api = FakeConfigApi::serving(served());
    let store = store(api);

    store.fetch_config().await.unwrap();

    assert_eq!(store.hosting_type(), Some(HostingType::Organization));
    assert_eq!(store.repo_names(), vec!["acme/prompts", "acme/evals"]);
    assert!(store.state().last_sync.is_some());
  }

  #[tokio::test]
  async fn test_initialize_skips_when_fresh() {
    let api = FakeConfigApi::serving(served());
    let store = store(api.clone());

    assert_eq!(store.initialize().await.unwrap(), CacheSource::Network);
    assert_eq!(store.initialize().await.unwrap(), CacheSource::CacheFresh);
    assert_eq!(api.get_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_failure_keeps_previous_config() {
    let api = FakeConfigApi::serving(served());
    let store = store(api.clone());
    store.fetch_config().await.unwrap();

    *api.fail.lock().unwrap() = true;
    assert!(store.fetch_config().await.is_err());

    let state = store.state();
    assert_eq!(state.repo_configs.len(), 2);
    assert!(state.error.is_some());
    assert!(!state.flags.is_loading);
  }

  #[tokio::test]
  async fn test_add_repo_uses_backend_copy() {
    let api = FakeConfigApi::serving(AppConfig::default());
    let store = store(api);

    let mut config = repo("acme/new");
    config.base_branch.clear();
    let saved = store.add_repo_config(config).await.unwrap();

    assert_eq!(saved.base_branch, "main");
    assert_eq!(store.repo_configs(), vec![saved]);
  }

  #[tokio::test]
  async fn test_add_repo_rolls_back() {
    let api = FakeConfigApi::serving(served());
    let store = store(api.clone());
    store.fetch_config().await.unwrap();
    *api.fail.lock().unwrap() = true;

    let mut changed = repo("acme/prompts");
    changed.base_branch = "develop".to_string();
    assert!(store.add_repo_config(changed).await.is_err());
    assert!(store.add_repo_config(repo("acme/other")).await.is_err());

    assert_eq!(store.repo_configs(), served().repo_configs);
    assert!(!store.state().flags.is_creating);
  }

  #[tokio::test]
  async fn test_remove_repo_rolls_back_in_place() {
    let api = FakeConfigApi::serving(served());
    let store = store(api.clone());
    store.fetch_config().await.unwrap();
    *api.fail.lock().unwrap() = true;

    assert!(store.remove_repo_config("acme/prompts").await.is_err());
    assert_eq!(store.repo_names(), vec!["acme/prompts", "acme/evals"]);

    *api.fail.lock().unwrap() = false;
    store.remove_repo_config("acme/prompts").await.unwrap();
    assert_eq!(store.repo_names(), vec!["acme/evals"]);
  }

  #[tokio::test]
  async fn test_llm_config_rolls_back() {
    let api = FakeConfigApi::serving(AppConfig::default());
    let store = store(api.clone());
    let llm = LlmConfig {
      id: "openai".to_string(),
      provider: "openai".to_string(),
      model: "gpt-4o".to_string(),
      api_base_url: None,
    };
    store.save_llm_config(llm.clone()).await.unwrap();

    *api.fail.lock().unwrap() = true;
    let mut changed = llm.clone();
    changed.model = "gpt-4.1".to_string();
    assert!(store.save_llm_config(changed).await.is_err());
    assert_eq!(store.state().llm_configs, vec![llm]);
  }

  #[tokio::test]
  async fn test_persists_to_local_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::Local(LocalStorage::open(dir.path()).unwrap());
    let api = FakeConfigApi::serving(served());

    let first = ConfigStore::new(api.clone(), storage.clone(), Duration::from_secs(300));
    first.fetch_config().await.unwrap();

    let second = ConfigStore::new(api.clone(), storage, Duration::from_secs(300));
    assert!(second.hydrate().await);
    assert_eq!(second.repo_names(), first.repo_names());
    assert_eq!(second.initialize().await.unwrap(), CacheSource::CacheFresh);
    assert_eq!(api.get_calls.load(Ordering::SeqCst), 1);
  }
}
