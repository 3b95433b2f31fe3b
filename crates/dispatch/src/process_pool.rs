//! Broker-free runner: one OS process per unit of work.
//!
//! For environments without a task queue, each submitted unit spawns a
//! child process, capped at a fixed concurrency. Submission past the cap
//! is rejected rather than queued, so callers retry later instead of
//! building an unbounded backlog. States are derived by polling child
//! liveness and exit codes.

use chrono::{DateTime, Utc};
use dredge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
  Pending,
  Running,
  Success,
  Failure,
  Cancelled,
}

impl UnitState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, UnitState::Success | UnitState::Failure | UnitState::Cancelled)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
  pub id: String,
  pub state: UnitState,
  pub submitted_at: DateTime<Utc>,
  pub exit_code: Option<i32>,
}

struct Unit {
  status: UnitStatus,
  child: Option<Child>,
}

pub struct ProcessPool {
  max_concurrency: usize,
  units: Mutex<BTreeMap<String, Unit>>,
}

impl ProcessPool {
  pub fn new(max_concurrency: usize) -> Self {
    Self {
      max_concurrency,
      units: Mutex::new(BTreeMap::new()),
    }
  }

  /// Spawn a child for the unit. Errors when the id is already tracked or
  /// the pool is at capacity; a capacity rejection means "retry later",
  /// never "queued".
  pub async fn submit(&self, id: &str, mut command: Command) -> Result<()> {
    let mut units = self.units.lock().await;

    if units.get(id).is_some_and(|u| !u.status.state.is_terminal()) {
      return Err(Error::Dispatch(format!("unit {} already active", id)));
    }

    let active = units.values().filter(|u| u.status.state == UnitState::Running).count();
    if active >= self.max_concurrency {
      return Err(Error::Dispatch(format!(
        "process pool at capacity ({}/{})",
        active, self.max_concurrency
      )));
    }

    let mut status = UnitStatus {
      id: id.to_string(),
      state: UnitState::Pending,
      submitted_at: Utc::now(),
      exit_code: None,
    };

    let child = command.spawn()?;
    status.state = UnitState::Running;
    debug!(id, "spawned unit process");

    units.insert(
      id.to_string(),
      Unit {
        status,
        child: Some(child),
      },
    );
    Ok(())
  }

  /// Refresh every unit's state from child liveness and exit codes
  pub async fn poll(&self) -> Result<()> {
    let mut units = self.units.lock().await;
    for unit in units.values_mut() {
      if unit.status.state != UnitState::Running {
        continue;
      }
      let Some(child) = unit.child.as_mut() else {
        continue;
      };
      match child.try_wait() {
        Ok(Some(exit)) => {
          unit.status.exit_code = exit.code();
          unit.status.state = if exit.success() {
            UnitState::Success
          } else {
            UnitState::Failure
          };
          unit.child = None;
        }
        Ok(None) => {} // still running
        Err(e) => {
          warn!(id = %unit.status.id, "failed to poll unit process: {}", e);
          unit.status.state = UnitState::Failure;
          unit.child = None;
        }
      }
    }
    Ok(())
  }

  /// Kill a running unit and mark it cancelled
  pub async fn cancel(&self, id: &str) -> Result<()> {
    let mut units = self.units.lock().await;
    let unit = units.get_mut(id).ok_or_else(|| Error::NotFound {
      entity: "unit",
      id: id.to_string(),
    })?;
    if let Some(child) = unit.child.as_mut() {
      child.kill().await?;
      unit.child = None;
    }
    if !unit.status.state.is_terminal() {
      unit.status.state = UnitState::Cancelled;
    }
    Ok(())
  }

  pub async fn status(&self, id: &str) -> Option<UnitStatus> {
    let units = self.units.lock().await;
    units.get(id).map(|u| u.status.clone())
  }

  pub async fn running_count(&self) -> usize {
    let units = self.units.lock().await;
    units.values().filter(|u| u.status.state == UnitState::Running).count()
  }

  /// Drop terminal units from tracking
  pub async fn reap(&self) {
    let mut units = self.units.lock().await;
    units.retain(|_, u| !u.status.state.is_terminal());
  }
}
