//! Domain types cached by the stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity::RepoEntity;

/// Prompt stored in a configured repository.
///
/// Discovery returns metadata only; `content` is filled when the prompt is
/// fetched by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
  pub repo_name: String,
  pub file_path: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl Prompt {
  /// New unsaved prompt; the backend assigns a path on first save.
  pub fn draft(repo_name: &str, name: &str) -> Self {
    Self {
      repo_name: repo_name.to_string(),
      file_path: String::new(),
      name: name.to_string(),
      description: String::new(),
      category: None,
      tags: Vec::new(),
      content: None,
      updated_at: None,
    }
  }
}

impl RepoEntity for Prompt {
  const KIND: &'static str = "prompt";
  const COLLECTION: &'static str = "prompts";
  const STORE_NAME: &'static str = "prompt-store";

  fn repo_name(&self) -> &str {
    &self.repo_name
  }

  fn file_path(&self) -> &str {
    &self.file_path
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn set_location(&mut self, repo_name: &str, file_path: &str) {
    self.repo_name = repo_name.to_string();
    self.file_path = file_path.to_string();
  }
}

/// Single test case of an eval suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalTest {
  pub name: String,
  #[serde(default)]
  pub template_variables: BTreeMap<String, String>,
  #[serde(default)]
  pub expected_output: Option<String>,
}

/// Evaluation suite stored alongside prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eval {
  pub repo_name: String,
  pub file_path: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub prompt_reference: Option<String>,
  #[serde(default)]
  pub tests: Vec<EvalTest>,
}

impl RepoEntity for Eval {
  const KIND: &'static str = "eval";
  const COLLECTION: &'static str = "evals";
  const STORE_NAME: &'static str = "eval-store";

  fn repo_name(&self) -> &str {
    &self.repo_name
  }

  fn file_path(&self) -> &str {
    &self.file_path
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn set_location(&mut self, repo_name: &str, file_path: &str) {
    self.repo_name = repo_name.to_string();
    self.file_path = file_path.to_string();
  }
}

/// How the backend is deployed. Individual hosting runs without login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostingType {
  #[default]
  Individual,
  Organization,
  Multitenant,
}

impl HostingType {
  pub fn requires_auth(self) -> bool {
    !matches!(self, HostingType::Individual)
  }
}

/// A repository the user configured for prompt discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
  pub repo_name: String,
  #[serde(default)]
  pub base_branch: String,
  #[serde(default)]
  pub current_branch: String,
}

/// LLM provider credentials reference. The secret itself never reaches the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
  pub id: String,
  pub provider: String,
  pub model: String,
  #[serde(default)]
  pub api_base_url: Option<String>,
}

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub username: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub avatar_url: Option<String>,
}

impl User {
  /// Placeholder identity used when the backend runs in individual mode.
  pub fn local() -> Self {
    Self {
      id: "local".to_string(),
      username: "local".to_string(),
      name: Some("Local User".to_string()),
      email: None,
      avatar_url: None,
    }
  }
}
