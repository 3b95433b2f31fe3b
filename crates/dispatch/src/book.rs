//! Durable per-task bookkeeping.
//!
//! The broker's own result backend may be disabled, so these rows are the
//! sole operator-facing record of what each dispatched task did. The
//! lifecycle is PENDING on submission, STARTED when a worker picks the
//! task up, then SUCCESS or FAILURE. Failures are recorded and re-raised
//! so the queue's native retry machinery still fires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dredge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Started,
  Success,
  Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
  pub task_id: String,
  pub name: String,
  pub status: TaskStatus,
  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

/// Row store for task records. Writes are scoped to one row; implementors
/// need no cross-row transactions.
#[async_trait]
pub trait TaskBook: Send + Sync {
  async fn record_pending(&self, task_id: &str, name: &str) -> Result<()>;
  async fn record_started(&self, task_id: &str) -> Result<()>;
  async fn record_success(&self, task_id: &str) -> Result<()>;
  async fn record_failure(&self, task_id: &str, error: &str) -> Result<()>;
  async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>>;
  async fn list(&self) -> Result<Vec<TaskRecord>>;
}

#[derive(Default)]
pub struct MemoryTaskBook {
  rows: Mutex<BTreeMap<String, TaskRecord>>,
}

impl MemoryTaskBook {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TaskBook for MemoryTaskBook {
  async fn record_pending(&self, task_id: &str, name: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    rows.insert(
      task_id.to_string(),
      TaskRecord {
        task_id: task_id.to_string(),
        name: name.to_string(),
        status: TaskStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        error: None,
      },
    );
    Ok(())
  }

  async fn record_started(&self, task_id: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    let row = rows.get_mut(task_id).ok_or_else(|| Error::NotFound {
      entity: "task",
      id: task_id.to_string(),
    })?;
    row.status = TaskStatus::Started;
    row.started_at = Some(Utc::now());
    Ok(())
  }

  async fn record_success(&self, task_id: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    let row = rows.get_mut(task_id).ok_or_else(|| Error::NotFound {
      entity: "task",
      id: task_id.to_string(),
    })?;
    row.status = TaskStatus::Success;
    row.finished_at = Some(Utc::now());
    Ok(())
  }

  async fn record_failure(&self, task_id: &str, error: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    let row = rows.get_mut(task_id).ok_or_else(|| Error::NotFound {
      entity: "task",
      id: task_id.to_string(),
    })?;
    row.status = TaskStatus::Failure;
    row.finished_at = Some(Utc::now());
    row.error = Some(error.to_string());
    Ok(())
  }

  async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
    let rows = self.rows.lock().await;
    Ok(rows.get(task_id).cloned())
  }

  async fn list(&self) -> Result<Vec<TaskRecord>> {
    let rows = self.rows.lock().await;
    Ok(rows.values().cloned().collect())
  }
}

/// Run a unit of work between the STARTED and SUCCESS/FAILURE writes.
/// On failure the bookkeeping row is written first and the original error
/// is returned unchanged, so the caller's retry handling still applies.
pub async fn run_tracked<T, F>(book: &dyn TaskBook, task_id: &str, work: F) -> Result<T>
where
  F: Future<Output = Result<T>>,
{
  book.record_started(task_id).await?;
  match work.await {
    Ok(value) => {
      book.record_success(task_id).await?;
      debug!(task_id, "task succeeded");
      Ok(value)
    }
    Err(e) => {
      book.record_failure(task_id, &e.to_string()).await?;
      debug!(task_id, error = %e, "task failed");
      Err(e)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_lifecycle_pending_started_success() {
    let book = MemoryTaskBook::new();
    book.record_pending("t1", "delete_doc_1_d1").await.unwrap();
    assert_eq!(book.get("t1").await.unwrap().unwrap().status, TaskStatus::Pending);

    let result: Result<u32> = run_tracked(&book, "t1", async { Ok(42) }).await;
    assert_eq!(result.unwrap(), 42);

    let row = book.get("t1").await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Success);
    assert!(row.started_at.is_some());
    assert!(row.finished_at.is_some());
  }

  #[tokio::test]
  async fn test_failure_recorded_and_reraised() {
    let book = MemoryTaskBook::new();
    book.record_pending("t1", "index_1_1").await.unwrap();

    let result: Result<()> = run_tracked(&book, "t1", async {
      Err(Error::Embedding("rate limited".into()))
    })
    .await;

    // Original error propagates after bookkeeping
    assert!(matches!(result, Err(Error::Embedding(_))));
    let row = book.get("t1").await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Failure);
    assert_eq!(row.error.as_deref(), Some("Embedding: rate limited"));
  }

  #[tokio::test]
  async fn test_started_without_pending_is_not_found() {
    let book = MemoryTaskBook::new();
    assert!(matches!(
      book.record_started("ghost").await,
      Err(Error::NotFound { .. })
    ));
  }
}
