//! Authenticated session state, persisted for the lifetime of the session only.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AccessGate, CacheSource, Notifier, StateCell, StoreState};
use crate::api::AuthApi;
use crate::error::{ApiError, StoreError, StoreResult};
use crate::freshness::{is_stale, now_ms};
use crate::hydration::{clear_snapshot, Persisted};
use crate::persist::Storage;
use crate::types::{HostingType, User};

#[derive(Debug, Clone, Default)]
pub struct AuthState {
  pub user: Option<User>,
  pub is_authenticated: bool,
  pub last_sync: Option<i64>,
  pub is_loading: bool,
  pub error: Option<String>,
  pub has_hydrated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSnapshot {
  pub user: Option<User>,
  pub is_authenticated: bool,
  pub last_sync: Option<i64>,
}

impl Persisted for AuthState {
  const NAME: &'static str = "auth-store";
  const VERSION: u32 = 1;
  type Snapshot = AuthSnapshot;

  fn partialize(&self) -> AuthSnapshot {
    AuthSnapshot {
      user: self.user.clone(),
      is_authenticated: self.is_authenticated,
      last_sync: self.last_sync,
    }
  }

  fn restore(&mut self, snapshot: AuthSnapshot) {
    self.user = snapshot.user;
    self.is_authenticated = snapshot.is_authenticated;
    self.last_sync = snapshot.last_sync;
  }
}

impl StoreState for AuthState {
  fn mark_hydrated(&mut self) {
    self.has_hydrated = true;
  }
}

/// Store for the signed-in user.
#[derive(Clone)]
pub struct AuthStore {
  cell: Arc<StateCell<AuthState>>,
  api: Arc<dyn AuthApi>,
  notifier: Notifier,
  ttl: Duration,
}

impl AuthStore {
  pub fn new(api: Arc<dyn AuthApi>, storage: Storage, ttl: Duration) -> Self {
    Self::build(api, Notifier::new(), storage, ttl)
  }

  pub(crate) fn build(
    api: Arc<dyn AuthApi>,
    notifier: Notifier,
    storage: Storage,
    ttl: Duration,
  ) -> Self {
    Self {
      cell: Arc::new(StateCell::new(AuthState::default(), storage)),
      api,
      notifier,
      ttl,
    }
  }

  pub fn state(&self) -> AuthState {
    self.cell.snapshot()
  }

  pub fn subscribe(&self) -> watch::Receiver<AuthState> {
    self.cell.subscribe()
  }

  pub fn has_hydrated(&self) -> bool {
    self.cell.read(|s| s.has_hydrated)
  }

  pub fn user(&self) -> Option<User> {
    self.cell.read(|s| s.user.clone())
  }

  pub async fn hydrate(&self) -> bool {
    let found = self.cell.hydrate().await;
    debug!(store = AuthState::NAME, found, "hydrated");
    found
  }

  /// Establish the session for the given hosting mode.
  ///
  /// Individual hosting needs no login and makes no request. Otherwise the
  /// user is refreshed when the session snapshot is missing or stale.
  pub async fn initialize(&self, hosting: HostingType) -> StoreResult<CacheSource> {
    if !hosting.requires_auth() {
      debug!("individual hosting, skipping authentication");
      self.cell.update(|s| {
        s.user = Some(User::local());
        s.is_authenticated = true;
        s.last_sync = Some(now_ms());
        s.error = None;
      });
      return Ok(CacheSource::CacheFresh);
    }

    let (authenticated, last_sync) = self.cell.read(|s| (s.is_authenticated, s.last_sync));
    if authenticated && !is_stale(last_sync, self.ttl) {
      return Ok(CacheSource::CacheFresh);
    }

    self.refresh_user().await?;
    Ok(CacheSource::Network)
  }

  /// Ask the backend who is signed in.
  ///
  /// A 401/403 ends the session without raising an error notice.
  pub async fn refresh_user(&self) -> StoreResult<User> {
    self.cell.update(|s| {
      s.is_loading = true;
      s.error = None;
    });

    match self.api.current_user().await {
      Ok(user) => {
        info!(user = %user.username, "session refreshed");
        let result = user.clone();
        self.cell.update(|s| {
          s.user = Some(user);
          s.is_authenticated = true;
          s.last_sync = Some(now_ms());
          s.is_loading = false;
        });
        Ok(result)
      }
      Err(ApiError::Status { status, .. }) if status == 401 || status == 403 => {
        debug!(status, "session rejected");
        self.cell.update(|s| {
          s.user = None;
          s.is_authenticated = false;
          s.last_sync = None;
          s.is_loading = false;
        });
        Err(StoreError::NotAuthenticated)
      }
      Err(e) => {
        let err = StoreError::from(e);
        let message = format!("Failed to load user: {}", err);
        warn!(error = %err, "failed to load user");
        self.cell.update(|s| {
          s.is_loading = false;
          s.error = Some(message.clone());
        });
        self.notifier.error(message);
        Err(err)
      }
    }
  }

  /// Forget the session, including its persisted snapshot.
  pub fn logout(&self) {
    info!("logging out");
    clear_snapshot::<AuthState>(self.cell.storage());
    self.cell.update(|s| {
      s.user = None;
      s.is_authenticated = false;
      s.last_sync = None;
      s.is_loading = false;
      s.error = None;
    });
  }
}

impl AccessGate for AuthStore {
  fn is_authenticated(&self) -> bool {
    self.cell.read(|s| s.is_authenticated)
  }
}
