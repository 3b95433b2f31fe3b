//! Periodic coordinator scan.
//!
//! One logical instance walks every CC-pair, decides which sync passes the
//! pair is eligible for, claims the fence, enumerates units of work into
//! the task-set (always before dispatching to the queue), and marks
//! generation complete. A separate observe pass releases fences whose
//! task-sets have drained. Per-pair failures are logged and skipped so one
//! bad pair never stalls the rest of the scan; a lost execution lease
//! aborts the whole scan without further coordination writes.

use crate::registry::PairRegistry;
use coord::{CoordError, CoordinationStore, FencePayload, Lease, SyncFence};
use dispatch::{Priority, TaskBook, TaskPayload, TaskQueue};
use dredge_core::{
  CcPairId, CcPairStatus, ConnectorCredentialPair, CoordinatorConfig, DocumentId, SearchConfigId, SyncKind,
};
use index::DocumentLedger;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

const SCAN_LEASE_KEY: &str = "coordinator:scan";
const SYNC_QUEUE: &str = "sync";

#[derive(Error, Debug)]
pub enum SyncError {
  #[error("Coordination: {0}")]
  Coord(#[from] CoordError),

  #[error(transparent)]
  Core(#[from] dredge_core::Error),

  #[error("Execution lease lost mid-scan")]
  LeaseLost,
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// What one scan pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
  pub pairs_scanned: usize,
  pub passes_claimed: usize,
  pub tasks_dispatched: usize,
}

pub struct Coordinator {
  store: Arc<dyn CoordinationStore>,
  registry: Arc<dyn PairRegistry>,
  ledger: Arc<dyn DocumentLedger>,
  queue: Arc<dyn TaskQueue>,
  book: Arc<dyn TaskBook>,
  config: CoordinatorConfig,
  search_config: SearchConfigId,
}

impl Coordinator {
  pub fn new(
    store: Arc<dyn CoordinationStore>,
    registry: Arc<dyn PairRegistry>,
    ledger: Arc<dyn DocumentLedger>,
    queue: Arc<dyn TaskQueue>,
    book: Arc<dyn TaskBook>,
    config: CoordinatorConfig,
    search_config: SearchConfigId,
  ) -> Self {
    Self {
      store,
      registry,
      ledger,
      queue,
      book,
      config,
      search_config,
    }
  }

  fn fence_for(&self, cc_pair: CcPairId, kind: SyncKind) -> SyncFence {
    match kind {
      SyncKind::Indexing => SyncFence::for_indexing(self.store.clone(), cc_pair, self.search_config),
      _ => SyncFence::new(self.store.clone(), kind, cc_pair),
    }
  }

  fn eligible_kinds(pair: &ConnectorCredentialPair) -> Vec<SyncKind> {
    match pair.status {
      CcPairStatus::Deleting => vec![SyncKind::Deletion],
      CcPairStatus::Active => {
        let mut kinds = vec![SyncKind::Indexing];
        if pair.permission_sync_enabled {
          kinds.push(SyncKind::PermissionSync);
        }
        kinds
      }
      CcPairStatus::Paused => Vec::new(),
    }
  }

  /// One scan pass. A no-op when another coordinator holds the scan lease.
  pub async fn scan(&self) -> Result<ScanStats> {
    let lease = Lease::new(
      self.store.clone(),
      SCAN_LEASE_KEY,
      Duration::from_secs(self.config.lease_timeout_secs),
    );
    if !lease.acquire(false, Duration::ZERO).await? {
      debug!("another coordinator holds the scan lease, skipping");
      return Ok(ScanStats::default());
    }

    let result = self.scan_inner(&lease).await;
    // Best-effort: a lost lease is already someone else's to release
    let _ = lease.release().await;
    result
  }

  async fn scan_inner(&self, lease: &Lease) -> Result<ScanStats> {
    let mut stats = ScanStats::default();

    for pair in self.registry.list().await? {
      stats.pairs_scanned += 1;

      for kind in Self::eligible_kinds(&pair) {
        match self.launch_pass(lease, &pair, kind).await {
          Ok(Some(dispatched)) => {
            stats.passes_claimed += 1;
            stats.tasks_dispatched += dispatched;
          }
          Ok(None) => {}
          // A lost lease means another instance may be scanning: stop
          // writing coordination state entirely
          Err(SyncError::LeaseLost) => return Err(SyncError::LeaseLost),
          // Isolation: one pair's failure never stalls the others
          Err(e) => {
            error!(cc_pair = %pair.id, kind = %kind, "sync pass failed: {}", e);
          }
        }
      }
    }

    info!(
      pairs = stats.pairs_scanned,
      claimed = stats.passes_claimed,
      dispatched = stats.tasks_dispatched,
      "scan complete"
    );
    Ok(stats)
  }

  /// Claim the fence for (pair, kind) and fan the pass out into unit
  /// tasks. Returns None when the fence was already claimed.
  async fn launch_pass(
    &self,
    lease: &Lease,
    pair: &ConnectorCredentialPair,
    kind: SyncKind,
  ) -> Result<Option<usize>> {
    let fence = self.fence_for(pair.id, kind);
    if fence.is_fenced().await? {
      debug!(cc_pair = %pair.id, kind = %kind, "pass already active, skipping");
      return Ok(None);
    }

    let generator_id = fence.new_task_id();
    if !fence.claim(FencePayload::new(&generator_id)).await? {
      return Ok(None);
    }

    // A failed enumeration must release the claim, or no later scan could
    // ever relaunch this (pair, kind): without a generation marker the
    // observer never completes the fence. A lost lease is the exception;
    // another instance may be scanning, so nothing more is written.
    match self.generate_units(lease, &fence, pair, kind).await {
      Ok(total) => Ok(Some(total)),
      Err(SyncError::LeaseLost) => Err(SyncError::LeaseLost),
      Err(e) => {
        if let Err(cleanup_err) = fence.cleanup().await {
          error!(cc_pair = %pair.id, kind = %kind, "fence cleanup after failed enumeration: {}", cleanup_err);
        }
        Err(e)
      }
    }
  }

  /// Enumerate the pair's documents into unit tasks and write the
  /// generation marker. The fence must already be claimed.
  async fn generate_units(
    &self,
    lease: &Lease,
    fence: &SyncFence,
    pair: &ConnectorCredentialPair,
    kind: SyncKind,
  ) -> Result<usize> {
    fence.mark_started().await?;

    // Enumeration over a large pair can outlive the lease timeout, so the
    // lease is refreshed on a fraction of it; losing it mid-enumeration
    // aborts before any further state is written.
    let reacquire_after = lease.timeout().mul_f64(self.config.lease_reacquire_fraction.clamp(0.0, 1.0));
    let mut last_reacquire = Instant::now();

    let mut total = 0usize;
    let mut offset = 0usize;
    loop {
      if last_reacquire.elapsed() >= reacquire_after {
        lease.reacquire().await.map_err(|_| SyncError::LeaseLost)?;
        last_reacquire = Instant::now();
      }

      let page = self
        .ledger
        .document_ids(pair.id, offset, self.config.enumeration_page_size)
        .await?;
      if page.is_empty() {
        break;
      }
      offset += page.len();

      for payload in self.unit_payloads(pair.id, kind, page) {
        let task_id = fence.new_task_id();
        // Task-set membership strictly before dispatch: a crash here
        // leaves an entry a worker will eventually clear, never the
        // reverse
        fence.add_task(&task_id).await?;
        self.book.record_pending(&task_id, &payload.task_name()).await?;
        self.queue.submit(payload, &task_id, Priority::Medium, SYNC_QUEUE).await?;
        total += 1;
      }
    }

    // Zero is legal: an empty pair is immediately up to date
    fence.mark_generated(total).await?;
    Ok(total)
  }

  /// Indexing re-syncs a whole enumeration page per task; deletion and
  /// permission sync work one document at a time
  fn unit_payloads(&self, cc_pair: CcPairId, kind: SyncKind, page: Vec<DocumentId>) -> Vec<TaskPayload> {
    match kind {
      SyncKind::Indexing => vec![TaskPayload::IndexBatch {
        cc_pair,
        search_config: self.search_config,
        document_ids: page,
      }],
      SyncKind::Deletion => page
        .into_iter()
        .map(|document_id| TaskPayload::DeleteDocument { cc_pair, document_id })
        .collect(),
      SyncKind::PermissionSync => page
        .into_iter()
        .map(|document_id| TaskPayload::PermissionSync { cc_pair, document_id })
        .collect(),
    }
  }

  /// Release every fence whose generation finished and whose task-set has
  /// drained. Safe to run from any process, any number of times.
  pub async fn observe(&self) -> Result<usize> {
    let mut completed = 0;

    for pair in self.registry.list().await? {
      // All kinds, not just currently-eligible ones: a pair's status may
      // have changed while a pass was draining
      for kind in [SyncKind::Deletion, SyncKind::Indexing, SyncKind::PermissionSync] {
        let fence = self.fence_for(pair.id, kind);
        if fence.is_complete().await? {
          fence.cleanup().await?;
          info!(cc_pair = %pair.id, kind = %kind, "sync pass complete");
          completed += 1;
        }
      }
    }

    Ok(completed)
  }
}
