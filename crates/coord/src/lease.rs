//! Execution lease for the coordinator scan.
//!
//! A token-stamped key with a deadline. The holder must reacquire well
//! before the deadline; a failed reacquire means another instance may have
//! taken over and the holder must stop writing coordination state.

use crate::store::{CoordError, CoordinationStore, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
  token: String,
  expires_at: DateTime<Utc>,
}

pub struct Lease {
  store: Arc<dyn CoordinationStore>,
  key: String,
  token: String,
  timeout: Duration,
}

impl Lease {
  pub fn new(store: Arc<dyn CoordinationStore>, key: impl Into<String>, timeout: Duration) -> Self {
    Self {
      store,
      key: key.into(),
      token: Uuid::new_v4().to_string(),
      timeout,
    }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  fn record(&self) -> Result<String> {
    let record = LeaseRecord {
      token: self.token.clone(),
      expires_at: Utc::now() + ChronoDuration::from_std(self.timeout).unwrap_or(ChronoDuration::seconds(60)),
    };
    Ok(serde_json::to_string(&record)?)
  }

  /// Try to take the lease. With `blocking`, retries until `wait` elapses.
  pub async fn acquire(&self, blocking: bool, wait: Duration) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
      if self.try_acquire_once().await? {
        debug!(key = %self.key, "lease acquired");
        return Ok(true);
      }
      if !blocking || tokio::time::Instant::now() >= deadline {
        return Ok(false);
      }
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
  }

  async fn try_acquire_once(&self) -> Result<bool> {
    let value = self.record()?;
    if self.store.set_nx(&self.key, &value).await? {
      return Ok(true);
    }
    // Key present: steal only if the holder's deadline has passed
    match self.store.get(&self.key).await? {
      Some(existing) => {
        let parsed: LeaseRecord = match serde_json::from_str(&existing) {
          Ok(record) => record,
          Err(e) => {
            warn!(key = %self.key, "corrupted lease record, replacing: {}", e);
            self.store.set(&self.key, &value).await?;
            return Ok(true);
          }
        };
        if parsed.token == self.token {
          // Already ours (re-entry after restart of the scan loop)
          self.store.set(&self.key, &value).await?;
          return Ok(true);
        }
        if parsed.expires_at <= Utc::now() {
          warn!(key = %self.key, "taking over expired lease");
          self.store.set(&self.key, &value).await?;
          return Ok(true);
        }
        Ok(false)
      }
      // Deleted between set_nx and get; next loop iteration will win
      None => Ok(false),
    }
  }

  /// Extend the deadline. Errors with `LeaseLost` when the key is gone or
  /// stamped with a different token; the caller must abort its scan.
  pub async fn reacquire(&self) -> Result<()> {
    match self.store.get(&self.key).await? {
      Some(existing) => {
        let parsed: LeaseRecord = serde_json::from_str(&existing).map_err(|_| CoordError::LeaseLost)?;
        if parsed.token != self.token {
          return Err(CoordError::LeaseLost);
        }
        let value = self.record()?;
        self.store.set(&self.key, &value).await?;
        Ok(())
      }
      None => Err(CoordError::LeaseLost),
    }
  }

  /// Drop the lease if we still own it
  pub async fn release(&self) -> Result<()> {
    if let Some(existing) = self.store.get(&self.key).await?
      && let Ok(parsed) = serde_json::from_str::<LeaseRecord>(&existing)
      && parsed.token == self.token
    {
      self.store.delete(&self.key).await?;
      debug!(key = %self.key, "lease released");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn store() -> Arc<dyn CoordinationStore> {
    Arc::new(MemoryStore::new())
  }

  #[tokio::test]
  async fn test_acquire_and_release() {
    let store = store();
    let lease = Lease::new(store.clone(), "lease:test", Duration::from_secs(60));
    assert!(lease.acquire(false, Duration::ZERO).await.unwrap());

    let rival = Lease::new(store.clone(), "lease:test", Duration::from_secs(60));
    assert!(!rival.acquire(false, Duration::ZERO).await.unwrap());

    lease.release().await.unwrap();
    assert!(rival.acquire(false, Duration::ZERO).await.unwrap());
  }

  #[tokio::test]
  async fn test_reacquire_extends() {
    let lease = Lease::new(store(), "lease:test", Duration::from_secs(60));
    assert!(lease.acquire(false, Duration::ZERO).await.unwrap());
    lease.reacquire().await.unwrap();
  }

  #[tokio::test]
  async fn test_reacquire_fails_after_steal() {
    let store = store();
    let lease = Lease::new(store.clone(), "lease:test", Duration::from_millis(0));
    assert!(lease.acquire(false, Duration::ZERO).await.unwrap());

    // Zero timeout means instantly expired; a rival takes over
    let rival = Lease::new(store.clone(), "lease:test", Duration::from_secs(60));
    assert!(rival.acquire(false, Duration::ZERO).await.unwrap());

    assert!(matches!(lease.reacquire().await, Err(CoordError::LeaseLost)));
  }

  #[tokio::test]
  async fn test_release_does_not_touch_rival() {
    let store = store();
    let lease = Lease::new(store.clone(), "lease:test", Duration::from_millis(0));
    assert!(lease.acquire(false, Duration::ZERO).await.unwrap());
    let rival = Lease::new(store.clone(), "lease:test", Duration::from_secs(60));
    assert!(rival.acquire(false, Duration::ZERO).await.unwrap());

    lease.release().await.unwrap();
    assert!(store.exists("lease:test").await.unwrap());
  }
}
