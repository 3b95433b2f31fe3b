//! Coordination-store abstraction.
//!
//! The fence protocol only needs atomic get/set/delete, set membership
//! operations, and a conditional write. Any key-value store providing
//! those can back it; `MemoryStore` is the in-process implementation used
//! embedded and in tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum CoordError {
  #[error("Store: {0}")]
  Store(String),
  #[error("Lease lost (expired or stolen)")]
  LeaseLost,
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoordError>;

/// Key-value coordination store with atomic set operations.
///
/// Each method is independently atomic; the protocol never requires a
/// multi-key transaction.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
  async fn exists(&self, key: &str) -> Result<bool>;
  async fn get(&self, key: &str) -> Result<Option<String>>;
  async fn set(&self, key: &str, value: &str) -> Result<()>;
  /// Write only when the key is absent. Returns true when the write won.
  async fn set_nx(&self, key: &str, value: &str) -> Result<bool>;
  async fn delete(&self, key: &str) -> Result<()>;

  async fn set_add(&self, key: &str, member: &str) -> Result<()>;
  async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
  async fn set_cardinality(&self, key: &str) -> Result<usize>;

  /// All value keys starting with `prefix` (set keys excluded)
  async fn scan(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
struct MemoryState {
  values: HashMap<String, String>,
  sets: HashMap<String, HashSet<String>>,
}

/// In-process coordination store over a single mutex
#[derive(Default, Clone)]
pub struct MemoryStore {
  state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
  async fn exists(&self, key: &str) -> Result<bool> {
    let state = self.state.lock().await;
    Ok(state.values.contains_key(key))
  }

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let state = self.state.lock().await;
    Ok(state.values.get(key).cloned())
  }

  async fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut state = self.state.lock().await;
    state.values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
    let mut state = self.state.lock().await;
    if state.values.contains_key(key) {
      return Ok(false);
    }
    state.values.insert(key.to_string(), value.to_string());
    Ok(true)
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let mut state = self.state.lock().await;
    state.values.remove(key);
    state.sets.remove(key);
    Ok(())
  }

  async fn set_add(&self, key: &str, member: &str) -> Result<()> {
    let mut state = self.state.lock().await;
    state.sets.entry(key.to_string()).or_default().insert(member.to_string());
    Ok(())
  }

  async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
    let mut state = self.state.lock().await;
    if let Some(set) = state.sets.get_mut(key) {
      set.remove(member);
      if set.is_empty() {
        state.sets.remove(key);
      }
    }
    Ok(())
  }

  async fn set_cardinality(&self, key: &str) -> Result<usize> {
    let state = self.state.lock().await;
    Ok(state.sets.get(key).map(|s| s.len()).unwrap_or(0))
  }

  async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
    let state = self.state.lock().await;
    let mut keys: Vec<String> = state.values.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
    keys.sort();
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_nx_wins_once() {
    let store = MemoryStore::new();
    assert!(store.set_nx("k", "a").await.unwrap());
    assert!(!store.set_nx("k", "b").await.unwrap());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
  }

  #[tokio::test]
  async fn test_set_membership() {
    let store = MemoryStore::new();
    store.set_add("s", "m1").await.unwrap();
    store.set_add("s", "m1").await.unwrap();
    store.set_add("s", "m2").await.unwrap();
    assert_eq!(store.set_cardinality("s").await.unwrap(), 2);

    store.set_remove("s", "m1").await.unwrap();
    assert_eq!(store.set_cardinality("s").await.unwrap(), 1);
    store.set_remove("s", "m2").await.unwrap();
    assert_eq!(store.set_cardinality("s").await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_delete_clears_both_shapes() {
    let store = MemoryStore::new();
    store.set("k", "v").await.unwrap();
    store.set_add("k", "m").await.unwrap();
    store.delete("k").await.unwrap();
    assert!(!store.exists("k").await.unwrap());
    assert_eq!(store.set_cardinality("k").await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_scan_prefix() {
    let store = MemoryStore::new();
    store.set("fence:1", "a").await.unwrap();
    store.set("fence:2", "b").await.unwrap();
    store.set("other:1", "c").await.unwrap();
    let keys = store.scan("fence:").await.unwrap();
    assert_eq!(keys, vec!["fence:1".to_string(), "fence:2".to_string()]);
  }
}
