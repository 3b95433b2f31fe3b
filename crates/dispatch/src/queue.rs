//! Task queue seam.
//!
//! The broker is external and at-least-once; this crate only defines the
//! submission interface and a schema-checked payload envelope, so workers
//! on different versions deserialize safely. `LocalQueue` is the
//! in-process implementation used embedded and in tests.

use async_trait::async_trait;
use dredge_core::{CcPairId, DocumentId, Error, Result, SearchConfigId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// One task kind per variant; the tag makes the envelope self-describing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
  IndexBatch {
    cc_pair: CcPairId,
    search_config: SearchConfigId,
    document_ids: Vec<DocumentId>,
  },
  DeleteDocument {
    cc_pair: CcPairId,
    document_id: DocumentId,
  },
  PermissionSync {
    cc_pair: CcPairId,
    document_id: DocumentId,
  },
}

impl TaskPayload {
  /// Deterministic name derived from the task's logical arguments, so a
  /// re-submission of the same work is traceable in the bookkeeping rows
  pub fn task_name(&self) -> String {
    match self {
      TaskPayload::IndexBatch {
        cc_pair, search_config, ..
      } => format!("index_{}_{}", cc_pair, search_config),
      TaskPayload::DeleteDocument { cc_pair, document_id } => {
        format!("delete_doc_{}_{}", cc_pair, document_id)
      }
      TaskPayload::PermissionSync { cc_pair, document_id } => {
        format!("permission_sync_{}_{}", cc_pair, document_id)
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  High,
  Medium,
  Low,
}

/// A task as it travels through the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
  pub id: String,
  pub name: String,
  pub payload: TaskPayload,
  pub priority: Priority,
  pub queue: String,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
  /// Hand a task to the broker under the caller's explicit id. The id is
  /// the caller's handle for fence task-set membership, so it is supplied,
  /// never generated here.
  async fn submit(&self, payload: TaskPayload, explicit_id: &str, priority: Priority, queue: &str) -> Result<()>;
}

/// In-process queue over an unbounded channel. Workers drain the receiver.
pub struct LocalQueue {
  tx: mpsc::UnboundedSender<QueuedTask>,
}

impl LocalQueue {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

#[async_trait]
impl TaskQueue for LocalQueue {
  async fn submit(&self, payload: TaskPayload, explicit_id: &str, priority: Priority, queue: &str) -> Result<()> {
    let task = QueuedTask {
      id: explicit_id.to_string(),
      name: payload.task_name(),
      payload,
      priority,
      queue: queue.to_string(),
    };
    debug!(id = %task.id, name = %task.name, queue = %task.queue, "task submitted");
    self
      .tx
      .send(task)
      .map_err(|_| Error::Dispatch("queue receiver dropped".into()))
  }
}
