//! Error types for REST collaborators and store actions.

/// Failure talking to the PromptRepo backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
  /// Request never produced a response.
  #[error("network error: {message}")]
  Network { message: String },

  /// Backend answered with a non-2xx status.
  #[error("request failed with status {status}: {message}")]
  Status { status: u16, message: String },

  /// Requested entity does not exist (404).
  #[error("not found: {what}")]
  NotFound { what: String },

  /// Response body did not match the expected shape.
  #[error("invalid response: {message}")]
  Decode { message: String },

  /// 2xx response whose payload reports a logical failure.
  #[error("operation failed: {message}")]
  SoftFailure { message: String },
}

/// Failure of a store action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
  #[error(transparent)]
  Api(#[from] ApiError),

  /// The action needs an authenticated session.
  #[error("not authenticated")]
  NotAuthenticated,

  /// A spawned action was aborted before it completed.
  #[error("operation was cancelled")]
  Cancelled,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
