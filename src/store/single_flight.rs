use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::sync::Mutex;

/// Coalesces concurrent runs of one operation.
///
/// While a run is in flight, further callers await the same shared future
/// instead of starting another. The slot is cleared once the run completes.
///
/// The slot only holds a weak handle: a run whose callers were all dropped
/// (e.g. an aborted task) is gone, and the next caller starts afresh.
pub struct SingleFlight<T: Clone> {
  inflight: Mutex<Option<WeakShared<BoxFuture<'static, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
  pub fn new() -> Self {
    Self {
      inflight: Mutex::new(None),
    }
  }

  pub fn is_running(&self) -> bool {
    self
      .inflight
      .lock()
      .map(|slot| live(&slot).is_some())
      .unwrap_or(false)
  }

  /// Join the in-flight run, or start one with `start`.
  pub async fn run<F>(&self, start: F) -> T
  where
    F: FnOnce() -> BoxFuture<'static, T>,
  {
    self.join_or_start(start, false).await
  }

  /// Start a new run even if one is in flight.
  ///
  /// Callers already awaiting the older run keep awaiting it; later callers
  /// join the new one.
  pub async fn run_fresh<F>(&self, start: F) -> T
  where
    F: FnOnce() -> BoxFuture<'static, T>,
  {
    self.join_or_start(start, true).await
  }

  async fn join_or_start<F>(&self, start: F, replace: bool) -> T
  where
    F: FnOnce() -> BoxFuture<'static, T>,
  {
    let future = {
      let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
      let existing = if replace { None } else { live(&slot) };
      match existing {
        Some(existing) => existing,
        None => {
          let future = start().shared();
          *slot = future.downgrade();
          future
        }
      }
    };

    let result = future.clone().await;

    let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
    if live(&slot).map_or(true, |current| current.ptr_eq(&future)) {
      *slot = None;
    }

    result
  }
}

/// The in-flight run, if anyone is still driving it.
fn live<T: Clone>(
  slot: &Option<WeakShared<BoxFuture<'static, T>>>,
) -> Option<Shared<BoxFuture<'static, T>>> {
  slot.as_ref().and_then(WeakShared::upgrade)
}
