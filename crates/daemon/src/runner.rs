//! Periodic driver for the coordinator.
//!
//! Ticks scan + observe on an interval until shutdown. The external
//! deployment may instead call `Coordinator::scan`/`observe` from its own
//! scheduler; this loop is the embedded equivalent.

use crate::coordinator::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error};

pub struct SyncRunner {
  coordinator: Arc<Coordinator>,
  shutdown_rx: broadcast::Receiver<()>,
  period: Duration,
}

impl SyncRunner {
  pub fn new(coordinator: Arc<Coordinator>, shutdown_rx: broadcast::Receiver<()>, period: Duration) -> Self {
    Self {
      coordinator,
      shutdown_rx,
      period,
    }
  }

  pub async fn run(mut self) {
    let mut timer = interval(self.period);
    // Skip the immediate tick
    timer.tick().await;

    loop {
      tokio::select! {
        _ = timer.tick() => {
          if let Err(e) = self.coordinator.scan().await {
            error!("coordinator scan failed: {}", e);
          }
          match self.coordinator.observe().await {
            Ok(completed) if completed > 0 => debug!(completed, "released drained fences"),
            Ok(_) => {}
            Err(e) => error!("completion observer failed: {}", e),
          }
        }
        _ = self.shutdown_rx.recv() => {
          debug!("sync runner received shutdown signal");
          break;
        }
      }
    }
  }
}

/// Spawn the runner as a background task
pub fn spawn_runner(
  coordinator: Arc<Coordinator>,
  shutdown_rx: broadcast::Receiver<()>,
  period: Duration,
) -> tokio::task::JoinHandle<()> {
  let runner = SyncRunner::new(coordinator, shutdown_rx, period);
  tokio::spawn(async move {
    runner.run().await;
  })
}
