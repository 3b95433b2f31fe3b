//! Lifecycle fence: at most one active sync pass per (CC-pair, kind).
//!
//! One protocol, three instantiations (deletion, indexing, permission
//! sync). The fence key existing means "a pass is claimed"; a durable
//! task-set tracks outstanding per-unit work; a generator-completion
//! marker records the total unit count once enumeration finishes. A pass
//! is done iff fence present, marker present, and task-set empty.

use crate::store::{CoordinationStore, Result};
use chrono::{DateTime, Utc};
use dredge_core::{CcPairId, SearchConfigId, SyncKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const FENCE_PREFIX: &str = "syncfence";

/// Payload stored under the fence key while a pass is claimed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FencePayload {
  /// Total enumerated units; None until generation completes
  pub num_tasks: Option<usize>,
  pub submitted_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  /// Id of the generator task that claimed this fence
  pub task_id: String,
}

impl FencePayload {
  pub fn new(task_id: impl Into<String>) -> Self {
    Self {
      num_tasks: None,
      submitted_at: Utc::now(),
      started_at: None,
      task_id: task_id.into(),
    }
  }
}

/// Handle on one fence key and its companion task-set and marker keys
pub struct SyncFence {
  store: Arc<dyn CoordinationStore>,
  kind: SyncKind,
  cc_pair: CcPairId,
  key: String,
}

impl SyncFence {
  pub fn new(store: Arc<dyn CoordinationStore>, kind: SyncKind, cc_pair: CcPairId) -> Self {
    let key = format!("{}:{}:{}", FENCE_PREFIX, kind, cc_pair);
    Self {
      store,
      kind,
      cc_pair,
      key,
    }
  }

  /// Indexing fences carry the search configuration so two embedding
  /// configurations can index the same pair concurrently during migration.
  pub fn for_indexing(store: Arc<dyn CoordinationStore>, cc_pair: CcPairId, search_config: SearchConfigId) -> Self {
    let key = format!("{}:{}:{}:{}", FENCE_PREFIX, SyncKind::Indexing, cc_pair, search_config);
    Self {
      store,
      kind: SyncKind::Indexing,
      cc_pair,
      key,
    }
  }

  pub fn kind(&self) -> SyncKind {
    self.kind
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  fn taskset_key(&self) -> String {
    format!("{}:taskset", self.key)
  }

  fn marker_key(&self) -> String {
    format!("{}:generated", self.key)
  }

  /// Prefix-tagged unit task id. The tag is for operators reading queue
  /// dumps, not for protocol correctness.
  pub fn new_task_id(&self) -> String {
    format!("{}_{}_{}", self.kind, self.cc_pair, Uuid::new_v4())
  }

  /// True iff a pass is currently claimed
  pub async fn is_fenced(&self) -> Result<bool> {
    self.store.exists(&self.key).await
  }

  /// Claim the pass. Returns false (a no-op skip, not an error) when
  /// another pass already holds the fence.
  pub async fn claim(&self, payload: FencePayload) -> Result<bool> {
    let value = serde_json::to_string(&payload)?;
    let claimed = self.store.set_nx(&self.key, &value).await?;
    if claimed {
      info!(key = %self.key, "fence claimed");
    } else {
      debug!(key = %self.key, "fence already claimed, skipping");
    }
    Ok(claimed)
  }

  pub async fn payload(&self) -> Result<Option<FencePayload>> {
    match self.store.get(&self.key).await? {
      Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
      None => Ok(None),
    }
  }

  /// Stamp the time enumeration actually began
  pub async fn mark_started(&self) -> Result<()> {
    if let Some(mut payload) = self.payload().await? {
      payload.started_at = Some(Utc::now());
      self.store.set(&self.key, &serde_json::to_string(&payload)?).await?;
    }
    Ok(())
  }

  /// Record a unit as outstanding. Must happen strictly before the unit's
  /// task is handed to the queue.
  pub async fn add_task(&self, task_id: &str) -> Result<()> {
    self.store.set_add(&self.taskset_key(), task_id).await
  }

  /// Called by the worker that completed (or definitively abandoned) a unit
  pub async fn remove_task(&self, task_id: &str) -> Result<()> {
    self.store.set_remove(&self.taskset_key(), task_id).await
  }

  pub async fn outstanding(&self) -> Result<usize> {
    self.store.set_cardinality(&self.taskset_key()).await
  }

  /// Write the generator-completion marker. Zero is legal: an empty
  /// CC-pair still gets marked up to date.
  pub async fn mark_generated(&self, total: usize) -> Result<()> {
    self.store.set(&self.marker_key(), &total.to_string()).await?;
    if let Some(mut payload) = self.payload().await? {
      payload.num_tasks = Some(total);
      self.store.set(&self.key, &serde_json::to_string(&payload)?).await?;
    }
    info!(key = %self.key, total, "generation complete");
    Ok(())
  }

  /// Total unit count, present only after generation finished
  pub async fn generated(&self) -> Result<Option<usize>> {
    match self.store.get(&self.marker_key()).await? {
      Some(raw) => Ok(raw.parse::<usize>().ok()),
      None => Ok(None),
    }
  }

  /// Done iff fence present AND marker present AND task-set empty.
  /// An empty task-set without the marker only means enumeration has not
  /// produced (or finished producing) tasks yet.
  pub async fn is_complete(&self) -> Result<bool> {
    if !self.is_fenced().await? {
      return Ok(false);
    }
    if self.generated().await?.is_none() {
      return Ok(false);
    }
    Ok(self.outstanding().await? == 0)
  }

  /// Tear down marker, task-set, then the fence key last, so a concurrent
  /// observer never sees "no fence but leftover state". Idempotent.
  pub async fn cleanup(&self) -> Result<()> {
    self.store.delete(&self.marker_key()).await?;
    self.store.delete(&self.taskset_key()).await?;
    self.store.delete(&self.key).await?;
    info!(key = %self.key, "fence released");
    Ok(())
  }

  /// Fence keys currently present in the store, for operator surfaces
  pub async fn list_active(store: &dyn CoordinationStore, kind: SyncKind) -> Result<Vec<String>> {
    let prefix = format!("{}:{}:", FENCE_PREFIX, kind);
    let keys = store.scan(&prefix).await?;
    Ok(
      keys
        .into_iter()
        .filter(|k| !k.ends_with(":taskset") && !k.ends_with(":generated"))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn fence(store: &Arc<dyn CoordinationStore>) -> SyncFence {
    SyncFence::new(store.clone(), SyncKind::Deletion, CcPairId(7))
  }

  fn shared_store() -> Arc<dyn CoordinationStore> {
    Arc::new(MemoryStore::new())
  }

  #[tokio::test]
  async fn test_claim_is_exclusive() {
    let store = shared_store();
    let fence = fence(&store);

    assert!(!fence.is_fenced().await.unwrap());
    assert!(fence.claim(FencePayload::new("t1")).await.unwrap());
    assert!(fence.is_fenced().await.unwrap());

    // Second claim without release is a skip, never a second payload
    assert!(!fence.claim(FencePayload::new("t2")).await.unwrap());
    let payload = fence.payload().await.unwrap().unwrap();
    assert_eq!(payload.task_id, "t1");
  }

  #[tokio::test]
  async fn test_concurrent_claims_exactly_one_wins() {
    let store = shared_store();
    let a = SyncFence::new(store.clone(), SyncKind::Deletion, CcPairId(7));
    let b = SyncFence::new(store.clone(), SyncKind::Deletion, CcPairId(7));

    let (ra, rb) = tokio::join!(a.claim(FencePayload::new("a")), b.claim(FencePayload::new("b")));
    let wins = [ra.unwrap(), rb.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    // Exactly one payload, with one submitted_at
    assert!(a.payload().await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_empty_set_is_not_complete_without_marker() {
    let store = shared_store();
    let fence = fence(&store);
    fence.claim(FencePayload::new("t")).await.unwrap();

    // Enumeration may still be running; empty task-set alone proves nothing
    assert!(!fence.is_complete().await.unwrap());

    fence.mark_generated(0).await.unwrap();
    assert!(fence.is_complete().await.unwrap());
  }

  #[tokio::test]
  async fn test_drain_to_completion() {
    let store = shared_store();
    let fence = fence(&store);
    fence.claim(FencePayload::new("gen")).await.unwrap();

    let t1 = fence.new_task_id();
    let t2 = fence.new_task_id();
    fence.add_task(&t1).await.unwrap();
    fence.add_task(&t2).await.unwrap();
    fence.mark_generated(2).await.unwrap();

    assert_eq!(fence.outstanding().await.unwrap(), 2);
    assert!(!fence.is_complete().await.unwrap());

    fence.remove_task(&t1).await.unwrap();
    assert!(!fence.is_complete().await.unwrap());

    fence.remove_task(&t2).await.unwrap();
    assert!(fence.is_complete().await.unwrap());

    let payload = fence.payload().await.unwrap().unwrap();
    assert_eq!(payload.num_tasks, Some(2));
  }

  #[tokio::test]
  async fn test_cleanup_is_idempotent() {
    let store = shared_store();
    let fence = fence(&store);
    fence.claim(FencePayload::new("t")).await.unwrap();
    fence.mark_generated(0).await.unwrap();

    fence.cleanup().await.unwrap();
    assert!(!fence.is_fenced().await.unwrap());

    // Observing completion twice and cleaning twice must not error
    fence.cleanup().await.unwrap();
  }

  #[tokio::test]
  async fn test_indexing_fences_keyed_per_search_config() {
    let store = shared_store();
    let a = SyncFence::for_indexing(store.clone(), CcPairId(3), SearchConfigId(1));
    let b = SyncFence::for_indexing(store.clone(), CcPairId(3), SearchConfigId(2));

    assert!(a.claim(FencePayload::new("a")).await.unwrap());
    // A migration config indexes the same pair concurrently
    assert!(b.claim(FencePayload::new("b")).await.unwrap());
  }

  #[tokio::test]
  async fn test_task_id_prefix_tagged() {
    let store = shared_store();
    let fence = fence(&store);
    let id = fence.new_task_id();
    assert!(id.starts_with("deletion_7_"));
  }

  #[tokio::test]
  async fn test_list_active() {
    let store = shared_store();
    let fence = fence(&store);
    fence.claim(FencePayload::new("t")).await.unwrap();
    fence.add_task("x").await.unwrap();
    fence.mark_generated(1).await.unwrap();

    let active = SyncFence::list_active(store.as_ref(), SyncKind::Deletion).await.unwrap();
    assert_eq!(active, vec![fence.key().to_string()]);
  }
}
