//! Wiring between the stores.
//!
//! The prompt and eval caches read the repository list from the config store
//! and their access gate from the auth store. Both are snapshot reads made at
//! the start of each discovery.

use color_eyre::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::api::{AuthApi, ConfigApi, EntityApi, HttpClient, RepoApi};
use crate::config::{CacheConfig, Config};
use crate::error::StoreResult;
use crate::persist::{IndexedStorage, LocalStorage, SessionStorage, Storage};
use crate::store::{
  AuthStore, ConfigStore, EvalStore, Notice, Notifier, PromptStore, RepoEntityStore,
};
use crate::types::{Eval, HostingType, Prompt};

/// REST collaborators used by the stores.
#[derive(Clone)]
pub struct Backend {
  pub prompts: Arc<dyn EntityApi<Prompt>>,
  pub evals: Arc<dyn EntityApi<Eval>>,
  pub repos: Arc<dyn RepoApi>,
  pub config: Arc<dyn ConfigApi>,
  pub auth: Arc<dyn AuthApi>,
}

impl Backend {
  pub fn http(client: HttpClient) -> Self {
    let client = Arc::new(client);
    Self {
      prompts: client.clone(),
      evals: client.clone(),
      repos: client.clone(),
      config: client.clone(),
      auth: client,
    }
  }
}

/// Storage medium for each store.
#[derive(Clone)]
pub struct Storages {
  /// Auth state, scoped to this process
  pub session: Storage,
  /// Configuration
  pub local: Storage,
  /// Prompt and eval caches
  pub indexed: Storage,
}

impl Storages {
  /// Open the durable backends under `dir`. A backend that cannot be opened
  /// is replaced by [`Storage::Unavailable`].
  pub fn open(dir: &Path) -> Self {
    let local = match LocalStorage::open(dir) {
      Ok(storage) => Storage::Local(storage),
      Err(e) => {
        warn!(error = %e, "local storage unavailable");
        Storage::Unavailable
      }
    };

    let indexed = match IndexedStorage::open(&dir.join("cache.db")) {
      Ok(storage) => Storage::Indexed(storage),
      Err(e) => {
        warn!(error = %e, "indexed storage unavailable");
        Storage::Unavailable
      }
    };

    Self {
      session: Storage::Session(SessionStorage::new()),
      local,
      indexed,
    }
  }

  /// Process-local storage only.
  pub fn ephemeral() -> Self {
    Self {
      session: Storage::Session(SessionStorage::new()),
      local: Storage::Session(SessionStorage::new()),
      indexed: Storage::Session(SessionStorage::new()),
    }
  }
}

/// All stores of one client session.
#[derive(Clone)]
pub struct Workspace {
  pub config: ConfigStore,
  pub auth: AuthStore,
  pub prompts: PromptStore,
  pub evals: EvalStore,
  notifier: Notifier,
}

impl Workspace {
  pub fn new(backend: Backend, storages: Storages, cache: &CacheConfig) -> Self {
    let notifier = Notifier::new();

    let config = ConfigStore::build(
      backend.config,
      notifier.clone(),
      storages.local,
      cache.config_ttl(),
    );
    let auth = AuthStore::build(
      backend.auth,
      notifier.clone(),
      storages.session,
      cache.auth_ttl(),
    );

    let prompts = RepoEntityStore::build(
      backend.prompts,
      backend.repos.clone(),
      Arc::new(config.clone()),
      Some(Arc::new(auth.clone())),
      notifier.clone(),
      storages.indexed.clone(),
      cache.prompt_ttl(),
    );
    let evals = RepoEntityStore::build(
      backend.evals,
      backend.repos,
      Arc::new(config.clone()),
      Some(Arc::new(auth.clone())),
      notifier.clone(),
      storages.indexed,
      cache.eval_ttl(),
    );

    Self {
      config,
      auth,
      prompts,
      evals,
      notifier,
    }
  }

  /// Build a workspace talking to the configured backend with durable storage.
  pub fn from_config(config: &Config) -> Result<Self> {
    let client = HttpClient::new(&config.api, Config::api_token())?;
    let dir = config.cache.storage_dir()?;
    Ok(Self::new(
      Backend::http(client),
      Storages::open(&dir),
      &config.cache,
    ))
  }

  pub fn notices(&self) -> broadcast::Receiver<Notice> {
    self.notifier.subscribe()
  }

  /// Hydrate every store from storage.
  pub async fn hydrate(&self) {
    tokio::join!(
      self.config.hydrate(),
      self.auth.hydrate(),
      self.prompts.hydrate(),
      self.evals.hydrate(),
    );
  }

  /// Hydrate, then bring configuration, session and caches up to date.
  ///
  /// Each step runs even if an earlier one failed, falling back to hydrated
  /// data; the first failure is returned.
  pub async fn bootstrap(&self) -> StoreResult<()> {
    self.hydrate().await;

    let mut first_error = None;

    if let Err(e) = self.config.initialize().await {
      first_error.get_or_insert(e);
    }

    let hosting = self.config.hosting_type().unwrap_or_default();
    if let Err(e) = self.auth.initialize(hosting).await {
      first_error.get_or_insert(e);
    }

    let (prompts, evals) = tokio::join!(self.prompts.initialize(), self.evals.initialize());
    if let Err(e) = prompts {
      first_error.get_or_insert(e);
    }
    if let Err(e) = evals {
      first_error.get_or_insert(e);
    }

    info!(
      prompts = self.prompts.state().entries.len(),
      evals = self.evals.state().entries.len(),
      "workspace ready"
    );

    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// End the session and resynchronize the caches for the signed-out state.
  pub async fn logout(&self) -> StoreResult<()> {
    self.auth.logout();
    let (prompts, evals) = tokio::join!(self.prompts.invalidate(), self.evals.invalidate());
    prompts?;
    evals
  }

  /// Drop every cached entity and rediscover.
  pub async fn clear_caches(&self) -> StoreResult<()> {
    let (prompts, evals) = tokio::join!(self.prompts.invalidate(), self.evals.invalidate());
    prompts?;
    evals
  }

  pub fn hosting_type(&self) -> HostingType {
    self.config.hosting_type().unwrap_or_default()
  }
}
