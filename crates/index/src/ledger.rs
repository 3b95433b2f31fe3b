//! In-memory `DocumentLedger`, used embedded and in tests.

use crate::traits::DocumentLedger;
use async_trait::async_trait;
use dredge_core::{CcPairId, DocumentId, Result};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct LedgerState {
  /// document -> stores it landed in
  stores: BTreeMap<DocumentId, BTreeSet<String>>,
  /// document -> owning CC-pairs
  pairs: BTreeMap<DocumentId, BTreeSet<CcPairId>>,
}

#[derive(Default)]
pub struct MemoryLedger {
  state: Mutex<LedgerState>,
}

impl MemoryLedger {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl DocumentLedger for MemoryLedger {
  async fn upsert(&self, document_id: &DocumentId, store_id: &str, cc_pair: CcPairId) -> Result<()> {
    let mut state = self.state.lock().await;
    state
      .stores
      .entry(document_id.clone())
      .or_default()
      .insert(store_id.to_string());
    state.pairs.entry(document_id.clone()).or_default().insert(cc_pair);
    Ok(())
  }

  async fn stores_for(&self, document_id: &DocumentId) -> Result<Vec<String>> {
    let state = self.state.lock().await;
    Ok(
      state
        .stores
        .get(document_id)
        .map(|s| s.iter().cloned().collect())
        .unwrap_or_default(),
    )
  }

  async fn remove(&self, document_id: &DocumentId) -> Result<()> {
    let mut state = self.state.lock().await;
    state.stores.remove(document_id);
    state.pairs.remove(document_id);
    Ok(())
  }

  async fn document_ids(&self, cc_pair: CcPairId, offset: usize, limit: usize) -> Result<Vec<DocumentId>> {
    let state = self.state.lock().await;
    Ok(
      state
        .pairs
        .iter()
        .filter(|(_, pairs)| pairs.contains(&cc_pair))
        .map(|(doc, _)| doc.clone())
        .skip(offset)
        .take(limit)
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_upsert_is_idempotent_per_store() {
    let ledger = MemoryLedger::new();
    let doc = DocumentId::new("d1");
    ledger.upsert(&doc, "keyword", CcPairId(1)).await.unwrap();
    ledger.upsert(&doc, "keyword", CcPairId(1)).await.unwrap();
    ledger.upsert(&doc, "vector", CcPairId(1)).await.unwrap();

    let stores = ledger.stores_for(&doc).await.unwrap();
    assert_eq!(stores, vec!["keyword".to_string(), "vector".to_string()]);
  }

  #[tokio::test]
  async fn test_pagination() {
    let ledger = MemoryLedger::new();
    for i in 0..5 {
      ledger
        .upsert(&DocumentId::new(format!("d{}", i)), "keyword", CcPairId(1))
        .await
        .unwrap();
    }

    let page1 = ledger.document_ids(CcPairId(1), 0, 2).await.unwrap();
    let page2 = ledger.document_ids(CcPairId(1), 2, 2).await.unwrap();
    let page3 = ledger.document_ids(CcPairId(1), 4, 2).await.unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 2);
    assert_eq!(page3.len(), 1);

    // No overlap across pages
    let mut all: Vec<_> = page1.into_iter().chain(page2).chain(page3).collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 5);
  }

  #[tokio::test]
  async fn test_remove_clears_rows() {
    let ledger = MemoryLedger::new();
    let doc = DocumentId::new("d1");
    ledger.upsert(&doc, "keyword", CcPairId(1)).await.unwrap();
    ledger.remove(&doc).await.unwrap();
    assert!(ledger.stores_for(&doc).await.unwrap().is_empty());
    assert!(ledger.document_ids(CcPairId(1), 0, 10).await.unwrap().is_empty());
  }
}
