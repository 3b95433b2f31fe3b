//! CC-pair registry seam.
//!
//! The control plane owns connector-credential pairs; the coordinator only
//! needs to list them with a status snapshot at scan time.

use async_trait::async_trait;
use dredge_core::{CcPairId, CcPairStatus, ConnectorCredentialPair, Error, Result};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait PairRegistry: Send + Sync {
  async fn list(&self) -> Result<Vec<ConnectorCredentialPair>>;
  async fn get(&self, id: CcPairId) -> Result<Option<ConnectorCredentialPair>>;
}

/// In-memory registry for embedded use and tests
#[derive(Default)]
pub struct MemoryRegistry {
  pairs: Mutex<BTreeMap<CcPairId, ConnectorCredentialPair>>,
}

impl MemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn upsert(&self, pair: ConnectorCredentialPair) {
    let mut pairs = self.pairs.lock().await;
    pairs.insert(pair.id, pair);
  }

  pub async fn set_status(&self, id: CcPairId, status: CcPairStatus) -> Result<()> {
    let mut pairs = self.pairs.lock().await;
    let pair = pairs.get_mut(&id).ok_or(Error::NotFound {
      entity: "cc_pair",
      id: id.to_string(),
    })?;
    pair.status = status;
    Ok(())
  }
}

#[async_trait]
impl PairRegistry for MemoryRegistry {
  async fn list(&self) -> Result<Vec<ConnectorCredentialPair>> {
    let pairs = self.pairs.lock().await;
    Ok(pairs.values().cloned().collect())
  }

  async fn get(&self, id: CcPairId) -> Result<Option<ConnectorCredentialPair>> {
    let pairs = self.pairs.lock().await;
    Ok(pairs.get(&id).cloned())
  }
}
