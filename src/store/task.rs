use tokio::task::JoinHandle;

use crate::error::{StoreError, StoreResult};

/// Handle to a store action running on its own task.
///
/// Dropping the handle lets the action complete and apply its result.
/// Call [`TaskHandle::abort`] to stop it instead.
pub struct TaskHandle<T> {
  handle: JoinHandle<StoreResult<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
  pub fn spawn<F>(future: F) -> Self
  where
    F: std::future::Future<Output = StoreResult<T>> + Send + 'static,
  {
    Self {
      handle: tokio::spawn(future),
    }
  }

  pub fn abort(&self) {
    self.handle.abort();
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }

  /// Wait for the action. An aborted action yields [`StoreError::Cancelled`].
  pub async fn join(self) -> StoreResult<T> {
    match self.handle.await {
      Ok(result) => result,
      Err(e) if e.is_cancelled() => Err(StoreError::Cancelled),
      Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
  }
}
