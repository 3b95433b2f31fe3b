//! Per-unit task entry points, invoked by the queue's worker runtime.
//!
//! Every unit runs inside the bookkeeping wrapper, so operators always see
//! STARTED and SUCCESS/FAILURE rows regardless of what the broker reports.
//! The worker removes its task id from the fence's task-set only after the
//! unit succeeded; a crash or failure leaves the id in place for a
//! watchdog or retry to deal with.

use async_trait::async_trait;
use coord::{CoordinationStore, SyncFence};
use dispatch::{QueuedTask, TaskBook, TaskPayload, run_tracked};
use dredge_core::{CcPairId, Document, DocumentId, Error, Result, SearchConfigId, SyncKind};
use index::{DocumentLedger, IndexAttemptMetadata, KeywordIndex, Pipeline, VectorIndex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Cooperative abort signal, checked between the sub-steps of a unit.
/// An aborted unit errors, so bookkeeping records FAILURE rather than a
/// false SUCCESS.
#[derive(Clone, Default)]
pub struct AbortHandle {
  flag: Arc<AtomicBool>,
}

impl AbortHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn abort(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_aborted(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  pub fn check(&self) -> Result<()> {
    if self.is_aborted() { Err(Error::Aborted) } else { Ok(()) }
  }
}

/// Fetches current document content for re-indexing. The 30+ real
/// connectors live outside this crate; workers only need this seam.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn fetch(&self, cc_pair: CcPairId, document_id: &DocumentId) -> Result<Option<Document>>;
}

/// Pushes one document's external permissions/groups into the index ACLs
#[async_trait]
pub trait PermissionSyncer: Send + Sync {
  async fn sync_document(&self, cc_pair: CcPairId, document_id: &DocumentId) -> Result<()>;
}

pub struct Worker {
  pub store: Arc<dyn CoordinationStore>,
  pub pipeline: Arc<Pipeline>,
  pub keyword: Arc<dyn KeywordIndex>,
  pub vector: Arc<dyn VectorIndex>,
  pub ledger: Arc<dyn DocumentLedger>,
  pub connector: Arc<dyn Connector>,
  pub permissions: Arc<dyn PermissionSyncer>,
  pub book: Arc<dyn TaskBook>,
  pub abort: AbortHandle,
}

impl Worker {
  /// Execute one queued task with bookkeeping, then clear its task-set
  /// entry. The entry is cleared on success, and also on a permanent
  /// failure: retrying cannot fix those, so leaving the entry would pin
  /// the fence open forever. Transient failures keep the entry for retry.
  pub async fn run(&self, task: QueuedTask) -> Result<()> {
    let fence = self.fence_for(&task.payload);
    let outcome = run_tracked(self.book.as_ref(), &task.id, self.execute(&task)).await;

    let abandon = matches!(&outcome, Err(e) if e.is_permanent());
    if abandon {
      warn!(task_id = %task.id, "abandoning unit after permanent failure");
    }
    if outcome.is_ok() || abandon {
      fence
        .remove_task(&task.id)
        .await
        .map_err(|e| Error::Coordination(e.to_string()))?;
    }
    outcome
  }

  fn fence_for(&self, payload: &TaskPayload) -> SyncFence {
    match payload {
      TaskPayload::IndexBatch {
        cc_pair, search_config, ..
      } => SyncFence::for_indexing(self.store.clone(), *cc_pair, *search_config),
      TaskPayload::DeleteDocument { cc_pair, .. } => {
        SyncFence::new(self.store.clone(), SyncKind::Deletion, *cc_pair)
      }
      TaskPayload::PermissionSync { cc_pair, .. } => {
        SyncFence::new(self.store.clone(), SyncKind::PermissionSync, *cc_pair)
      }
    }
  }

  async fn execute(&self, task: &QueuedTask) -> Result<()> {
    match &task.payload {
      TaskPayload::DeleteDocument { cc_pair, document_id } => {
        self.delete_document(*cc_pair, document_id).await
      }
      TaskPayload::IndexBatch {
        cc_pair,
        search_config,
        document_ids,
      } => self.index_batch(*cc_pair, *search_config, document_ids).await,
      TaskPayload::PermissionSync { cc_pair, document_id } => {
        self.abort.check()?;
        self.permissions.sync_document(*cc_pair, document_id).await
      }
    }
  }

  /// Remove one document's entries from both indices, then its ledger
  /// rows. Ledger last: if an index delete fails, the rows still point at
  /// the copies a retry must remove.
  async fn delete_document(&self, cc_pair: CcPairId, document_id: &DocumentId) -> Result<()> {
    debug!(cc_pair = %cc_pair, document = %document_id, "deleting document");

    self.abort.check()?;
    self.keyword.delete(document_id).await?;

    self.abort.check()?;
    self.vector.delete(document_id).await?;

    self.abort.check()?;
    self.ledger.remove(document_id).await?;
    Ok(())
  }

  /// Re-fetch and re-index a batch of documents through the pipeline
  async fn index_batch(
    &self,
    cc_pair: CcPairId,
    search_config: SearchConfigId,
    document_ids: &[DocumentId],
  ) -> Result<()> {
    let mut documents: Vec<Document> = Vec::with_capacity(document_ids.len());
    for document_id in document_ids {
      self.abort.check()?;
      match self.connector.fetch(cc_pair, document_id).await? {
        Some(doc) => documents.push(doc),
        // Source no longer has it; the next deletion pass reaps it
        None => warn!(cc_pair = %cc_pair, document = %document_id, "document gone from source, skipping"),
      }
    }

    self.abort.check()?;
    let metadata = IndexAttemptMetadata { cc_pair, search_config };
    let result = self.pipeline.index(&documents, &metadata).await?;
    debug!(
      cc_pair = %cc_pair,
      net_new = result.net_new_documents,
      chunks = result.total_chunks,
      "batch indexed"
    );
    Ok(())
  }
}
