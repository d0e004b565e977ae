//! Serde types matching PromptRepo API payloads.
//!
//! Entity payloads deserialize straight into the domain types; only the
//! envelopes that need unwrapping or checking live here.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::types::{HostingType, LlmConfig, RepoConfig};

// ============================================================================
// Config endpoint
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub hosting_type: HostingType,
  #[serde(default)]
  pub repo_configs: Vec<RepoConfig>,
  #[serde(default)]
  pub llm_configs: Vec<LlmConfig>,
}

// ============================================================================
// Discovery endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub(super) struct DiscoverRequest<'a> {
  pub repo_names: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(super) struct DiscoverResponse<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
}

// ============================================================================
// Reset-to-base-branch endpoint
// ============================================================================

/// Operation result embedded in a reset response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetData {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
}

/// Reset response. It fails when `status` is not `success` or when the
/// embedded `data.success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
  pub status: String,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub data: Option<ResetData>,
}

impl ResetResponse {
  pub fn success(message: &str) -> Self {
    Self {
      status: "success".to_string(),
      message: Some(message.to_string()),
      data: Some(ResetData {
        success: true,
        message: Some(message.to_string()),
      }),
    }
  }

  /// Check both signalling layers and surface a logical failure as an error.
  pub fn into_result(self) -> ApiResult<ResetData> {
    if self.status != "success" {
      return Err(ApiError::SoftFailure {
        message: self
          .message
          .unwrap_or_else(|| format!("reset returned status '{}'", self.status)),
      });
    }

    match self.data {
      Some(data) if data.success => Ok(data),
      Some(data) => Err(ApiError::SoftFailure {
        message: data
          .message
          .or(self.message)
          .unwrap_or_else(|| "reset to base branch failed".to_string()),
      }),
      None => Ok(ResetData {
        success: true,
        message: self.message,
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reset_success_passes_both_layers() {
    let data = ResetResponse::success("reset to main").into_result().unwrap();
    assert!(data.success);
  }

  #[test]
  fn test_reset_success_without_data() {
    let response: ResetResponse =
      serde_json::from_str(r#"{"status":"success","message":"done"}"#).unwrap();
    assert_eq!(
      response.into_result(),
      Ok(ResetData {
        success: true,
        message: Some("done".to_string())
      })
    );
  }

  #[test]
  fn test_reset_status_failure() {
    let response: ResetResponse =
      serde_json::from_str(r#"{"status":"error","message":"dirty tree","data":{"success":true}}"#)
        .unwrap();
    assert_eq!(
      response.into_result(),
      Err(ApiError::SoftFailure {
        message: "dirty tree".to_string()
      })
    );
  }

  #[test]
  fn test_reset_embedded_failure() {
    let response: ResetResponse = serde_json::from_str(
      r#"{"status":"success","data":{"success":false,"message":"merge conflict"}}"#,
    )
    .unwrap();
    assert_eq!(
      response.into_result(),
      Err(ApiError::SoftFailure {
        message: "merge conflict".to_string()
      })
    );
  }

  #[test]
  fn test_app_config_defaults() {
    let config: AppConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.hosting_type, HostingType::Individual);
    assert!(config.repo_configs.is_empty());
  }
}
