//! Dual-index ingestion pipeline.
//!
//! Keyword insertion runs before embedding on purpose: it is cheap and
//! fails fast, so a bad batch never spends embedding quota. Any error
//! aborts the whole batch; the dispatch layer records the failure and the
//! batch retries in full (index backends are idempotent per
//! (document_id, chunk_id), so a rerun is a re-upsert).

use crate::chunker::Chunker;
use crate::traits::{DocumentLedger, Embedder, KeywordIndex, VectorIndex};
use dredge_core::{
  CcPairId, DEFAULT_BOOST, DocAwareChunk, DocMetadataAwareIndexChunk, Document, IndexChunk, Result, SearchConfigId,
  net_new_document_count,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity of the indexing attempt a batch belongs to
#[derive(Debug, Clone, Copy)]
pub struct IndexAttemptMetadata {
  pub cc_pair: CcPairId,
  pub search_config: SearchConfigId,
}

/// What one batch produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingResult {
  pub net_new_documents: usize,
  pub total_chunks: usize,
}

pub struct Pipeline {
  chunker: Chunker,
  embedder: Arc<dyn Embedder>,
  keyword: Arc<dyn KeywordIndex>,
  vector: Arc<dyn VectorIndex>,
  ledger: Arc<dyn DocumentLedger>,
}

impl Pipeline {
  pub fn new(
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    keyword: Arc<dyn KeywordIndex>,
    vector: Arc<dyn VectorIndex>,
    ledger: Arc<dyn DocumentLedger>,
  ) -> Self {
    Self {
      chunker,
      embedder,
      keyword,
      vector,
      ledger,
    }
  }

  /// Chunk, insert into the keyword index, embed, insert into the vector
  /// index, keeping the ledger current for both stores. Returns the
  /// batch's net-new document count and total chunk count.
  pub async fn index(&self, documents: &[Document], metadata: &IndexAttemptMetadata) -> Result<IndexingResult> {
    // 1. Chunk everything into one flat list
    let chunks: Vec<DocAwareChunk> = documents.iter().flat_map(|doc| self.chunker.chunk(doc, 0)).collect();
    let total_chunks = chunks.len();
    debug!(
      cc_pair = %metadata.cc_pair,
      documents = documents.len(),
      chunks = total_chunks,
      "indexing batch"
    );

    // 2. Keyword index first, then ledger rows for that store
    let keyword_records = self.keyword.index(&chunks).await?;
    self
      .upsert_ledger_rows(&keyword_records, self.keyword.store_id(), metadata.cc_pair)
      .await?;

    // 3. Net-new as the keyword store saw it
    let keyword_net_new = net_new_document_count(&keyword_records);

    // 4. Embed the same flat list. Access lists start empty; the
    // permission sync pass fills them in against the live index.
    let embeddings = self.embedder.embed(&chunks).await?;
    let indexed: Vec<DocMetadataAwareIndexChunk> = chunks
      .into_iter()
      .zip(embeddings)
      .map(|(chunk, embedding)| {
        DocMetadataAwareIndexChunk::from_index_chunk(
          IndexChunk { chunk, embedding },
          Vec::new(),
          HashSet::new(),
          DEFAULT_BOOST,
        )
      })
      .collect();

    // 5. Vector index, then its ledger rows
    let vector_records = self.vector.index(&indexed).await?;
    self
      .upsert_ledger_rows(&vector_records, self.vector.store_id(), metadata.cc_pair)
      .await?;

    // 6. The two stores may drift transiently; report the larger count
    let vector_net_new = net_new_document_count(&vector_records);
    if keyword_net_new != vector_net_new {
      warn!(
        cc_pair = %metadata.cc_pair,
        keyword_net_new,
        vector_net_new,
        "net-new document counts disagree between stores"
      );
    }

    Ok(IndexingResult {
      net_new_documents: keyword_net_new.max(vector_net_new),
      total_chunks,
    })
  }

  /// One ledger row per distinct document per store, so deletion can find
  /// every store a document landed in
  async fn upsert_ledger_rows(
    &self,
    records: &[dredge_core::ChunkInsertionRecord],
    store_id: &str,
    cc_pair: CcPairId,
  ) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
      if seen.insert(&record.document_id) {
        self.ledger.upsert(&record.document_id, store_id, cc_pair).await?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ledger::MemoryLedger;
  use async_trait::async_trait;
  use dredge_core::{
    ChunkEmbedding, ChunkInsertionRecord, ChunkingConfig, DocumentId, Error, Section, SourceType,
  };
  use std::sync::atomic::{AtomicBool, Ordering};
  use tokio::sync::Mutex;

  struct FakeEmbedder {
    fail: AtomicBool,
  }

  impl FakeEmbedder {
    fn new() -> Self {
      Self {
        fail: AtomicBool::new(false),
      }
    }
  }

  #[async_trait]
  impl Embedder for FakeEmbedder {
    async fn embed(&self, chunks: &[DocAwareChunk]) -> Result<Vec<ChunkEmbedding>> {
      if self.fail.load(Ordering::SeqCst) {
        return Err(Error::Embedding("rate limited".into()));
      }
      Ok(
        chunks
          .iter()
          .map(|_| ChunkEmbedding {
            full: vec![0.0; 4],
            mini: Vec::new(),
          })
          .collect(),
      )
    }
  }

  /// Idempotent fake backend keyed by (document_id, chunk_id)
  #[derive(Default)]
  struct FakeBackend {
    store_id: String,
    seen: Mutex<HashSet<(DocumentId, usize)>>,
    seen_docs: Mutex<HashSet<DocumentId>>,
  }

  impl FakeBackend {
    fn new(store_id: &str) -> Self {
      Self {
        store_id: store_id.to_string(),
        ..Default::default()
      }
    }

    async fn insert(&self, document_id: &DocumentId, chunk_id: usize) -> ChunkInsertionRecord {
      self.seen.lock().await.insert((document_id.clone(), chunk_id));
      let already_existed = !self.seen_docs.lock().await.insert(document_id.clone());
      ChunkInsertionRecord {
        document_id: document_id.clone(),
        store_id: self.store_id.clone(),
        already_existed,
      }
    }
  }

  #[async_trait]
  impl KeywordIndex for FakeBackend {
    fn store_id(&self) -> &str {
      &self.store_id
    }

    async fn index(&self, chunks: &[DocAwareChunk]) -> Result<Vec<ChunkInsertionRecord>> {
      let mut records = Vec::new();
      for chunk in chunks {
        records.push(self.insert(&chunk.document_id, chunk.chunk_id).await);
      }
      Ok(records)
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<()> {
      self.seen.lock().await.retain(|(d, _)| d != document_id);
      self.seen_docs.lock().await.remove(document_id);
      Ok(())
    }
  }

  #[async_trait]
  impl VectorIndex for FakeBackend {
    fn store_id(&self) -> &str {
      &self.store_id
    }

    async fn index(&self, chunks: &[DocMetadataAwareIndexChunk]) -> Result<Vec<ChunkInsertionRecord>> {
      let mut records = Vec::new();
      for chunk in chunks {
        records.push(self.insert(chunk.document_id(), chunk.chunk_id()).await);
      }
      Ok(records)
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<()> {
      self.seen.lock().await.retain(|(d, _)| d != document_id);
      self.seen_docs.lock().await.remove(document_id);
      Ok(())
    }
  }

  fn document(id: &str, chars: usize) -> Document {
    Document::new(id, SourceType::Web, id).with_sections(vec![Section::new("x".repeat(chars), None)])
  }

  fn pipeline_with(
    embedder: Arc<FakeEmbedder>,
    keyword: Arc<FakeBackend>,
    vector: Arc<FakeBackend>,
    ledger: Arc<MemoryLedger>,
  ) -> Pipeline {
    Pipeline::new(
      Chunker::new(ChunkingConfig {
        chunk_size: 100,
        overlap: 10,
        ..ChunkingConfig::default()
      }),
      embedder,
      keyword,
      vector,
      ledger,
    )
  }

  fn metadata() -> IndexAttemptMetadata {
    IndexAttemptMetadata {
      cc_pair: CcPairId(1),
      search_config: SearchConfigId(1),
    }
  }

  #[tokio::test]
  async fn test_index_counts_net_new_and_chunks() {
    let keyword = Arc::new(FakeBackend::new("keyword"));
    let vector = Arc::new(FakeBackend::new("vector"));
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = pipeline_with(Arc::new(FakeEmbedder::new()), keyword, vector, ledger.clone());

    // 250 chars -> 3 chunks for d1; 50 chars -> 1 chunk for d2
    let docs = vec![document("d1", 250), document("d2", 50)];
    let result = pipeline.index(&docs, &metadata()).await.unwrap();

    assert_eq!(result.net_new_documents, 2);
    assert_eq!(result.total_chunks, 4);

    // Ledger knows both stores for each document
    let stores = ledger.stores_for(&DocumentId::new("d1")).await.unwrap();
    assert_eq!(stores.len(), 2);
  }

  #[tokio::test]
  async fn test_second_identical_run_is_net_new_zero() {
    let keyword = Arc::new(FakeBackend::new("keyword"));
    let vector = Arc::new(FakeBackend::new("vector"));
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = pipeline_with(Arc::new(FakeEmbedder::new()), keyword, vector, ledger);

    let docs = vec![document("d1", 250)];
    let first = pipeline.index(&docs, &metadata()).await.unwrap();
    let second = pipeline.index(&docs, &metadata()).await.unwrap();

    assert_eq!(first.net_new_documents, 1);
    assert_eq!(second.net_new_documents, 0);
    assert_eq!(first.total_chunks, second.total_chunks);
  }

  #[tokio::test]
  async fn test_embedding_failure_aborts_batch_before_vector_insert() {
    let embedder = Arc::new(FakeEmbedder::new());
    embedder.fail.store(true, Ordering::SeqCst);
    let keyword = Arc::new(FakeBackend::new("keyword"));
    let vector = Arc::new(FakeBackend::new("vector"));
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = pipeline_with(embedder, keyword, vector.clone(), ledger);

    let docs = vec![document("d1", 50)];
    let err = pipeline.index(&docs, &metadata()).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));

    // Nothing reached the vector store
    assert!(vector.seen.lock().await.is_empty());
  }

  #[tokio::test]
  async fn test_disagreeing_counts_report_maximum() {
    // Vector store pretends d1 already existed; keyword says it is new
    let keyword = Arc::new(FakeBackend::new("keyword"));
    let vector = Arc::new(FakeBackend::new("vector"));
    vector.seen_docs.lock().await.insert(DocumentId::new("d1"));
    let ledger = Arc::new(MemoryLedger::new());
    let pipeline = pipeline_with(Arc::new(FakeEmbedder::new()), keyword, vector, ledger);

    let docs = vec![document("d1", 50)];
    let result = pipeline.index(&docs, &metadata()).await.unwrap();
    assert_eq!(result.net_new_documents, 1);
  }

  #[tokio::test]
  async fn test_empty_batch() {
    let pipeline = pipeline_with(
      Arc::new(FakeEmbedder::new()),
      Arc::new(FakeBackend::new("keyword")),
      Arc::new(FakeBackend::new("vector")),
      Arc::new(MemoryLedger::new()),
    );
    let result = pipeline.index(&[], &metadata()).await.unwrap();
    assert_eq!(result.net_new_documents, 0);
    assert_eq!(result.total_chunks, 0);
  }
}
