//! Capability seams consumed by the pipeline.
//!
//! Embedding models and the physical index backends live outside this
//! crate; the pipeline only sees these traits. Index backends must be
//! idempotent per (document_id, chunk_id).

use async_trait::async_trait;
use dredge_core::{
  CcPairId, ChunkEmbedding, ChunkInsertionRecord, DocAwareChunk, DocMetadataAwareIndexChunk, DocumentId, Result,
};

/// Turns chunk text into vectors. Rate-limit and auth failures surface as
/// errors and abort the whole batch.
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, chunks: &[DocAwareChunk]) -> Result<Vec<ChunkEmbedding>>;
}

/// Keyword (lexical) index backend
#[async_trait]
pub trait KeywordIndex: Send + Sync {
  fn store_id(&self) -> &str;
  async fn index(&self, chunks: &[DocAwareChunk]) -> Result<Vec<ChunkInsertionRecord>>;
  async fn delete(&self, document_id: &DocumentId) -> Result<()>;
}

/// Vector index backend
#[async_trait]
pub trait VectorIndex: Send + Sync {
  fn store_id(&self) -> &str;
  async fn index(&self, chunks: &[DocMetadataAwareIndexChunk]) -> Result<Vec<ChunkInsertionRecord>>;
  async fn delete(&self, document_id: &DocumentId) -> Result<()>;
}

/// Relational bookkeeping: which stores each document landed in, linked to
/// its CC-pair, so deletion can later find every copy. Writes are scoped
/// to one document row; no cross-row transactions needed.
#[async_trait]
pub trait DocumentLedger: Send + Sync {
  /// Record that a document landed in a store under a CC-pair
  async fn upsert(&self, document_id: &DocumentId, store_id: &str, cc_pair: CcPairId) -> Result<()>;

  /// Every store a document was written to
  async fn stores_for(&self, document_id: &DocumentId) -> Result<Vec<String>>;

  /// Drop all rows for a document (after index deletion succeeded)
  async fn remove(&self, document_id: &DocumentId) -> Result<()>;

  /// Paginated enumeration of a CC-pair's known documents, for the
  /// coordinator's fan-out
  async fn document_ids(&self, cc_pair: CcPairId, offset: usize, limit: usize) -> Result<Vec<DocumentId>>;
}
