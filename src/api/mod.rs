//! REST collaborators the stores depend on.
//!
//! Stores only see these traits, so tests can substitute in-memory fakes. The
//! production implementation is [`HttpClient`].

mod api_types;
mod client;

pub use api_types::{AppConfig, ResetData, ResetResponse};
pub use client::HttpClient;

use async_trait::async_trait;

use crate::entity::RepoEntity;
use crate::error::ApiResult;
use crate::types::{LlmConfig, RepoConfig, User};

/// CRUD and discovery for one kind of repository entity.
#[async_trait]
pub trait EntityApi<E: RepoEntity>: Send + Sync {
  /// Discover every entity in the named repositories.
  async fn discover(&self, repo_names: &[String]) -> ApiResult<Vec<E>>;

  async fn get(&self, repo_name: &str, file_path: &str) -> ApiResult<E>;

  /// Save `entity` at `file_path`. The backend may store it elsewhere; the
  /// returned entity carries the authoritative location.
  async fn save(&self, repo_name: &str, file_path: &str, entity: &E) -> ApiResult<E>;

  async fn delete(&self, repo_name: &str, file_path: &str) -> ApiResult<()>;
}

/// Repository-level operations.
#[async_trait]
pub trait RepoApi: Send + Sync {
  /// Reset the working branch of `repo_name` to its base branch.
  ///
  /// A successful call may still carry a logical failure; see
  /// [`ResetResponse::into_result`].
  async fn reset_to_base_branch(&self, repo_name: &str) -> ApiResult<ResetResponse>;
}

/// Backend configuration endpoints.
#[async_trait]
pub trait ConfigApi: Send + Sync {
  async fn get_config(&self) -> ApiResult<AppConfig>;

  async fn save_repo_config(&self, config: &RepoConfig) -> ApiResult<RepoConfig>;

  async fn delete_repo_config(&self, repo_name: &str) -> ApiResult<()>;

  async fn save_llm_config(&self, config: &LlmConfig) -> ApiResult<LlmConfig>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
  async fn current_user(&self) -> ApiResult<User>;
}
