//! Cache freshness policy shared by every data-owning store.

use chrono::Utc;
use std::time::Duration;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
  Utc::now().timestamp_millis()
}

/// Check whether data last synced at `last_sync_ms` is stale for the given TTL.
///
/// `None` means the store never synced and is always stale.
pub fn is_stale(last_sync_ms: Option<i64>, ttl: Duration) -> bool {
  is_stale_at(last_sync_ms, ttl, now_ms())
}

/// Same as [`is_stale`] with an explicit `now`, for deterministic callers.
pub fn is_stale_at(last_sync_ms: Option<i64>, ttl: Duration, now_ms: i64) -> bool {
  match last_sync_ms {
    None => true,
    Some(last) => {
      let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
      now_ms.saturating_sub(last) >= ttl_ms
    }
  }
}
