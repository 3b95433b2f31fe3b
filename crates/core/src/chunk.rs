use crate::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A retrieval-sized slice of a document, produced by the chunker.
///
/// Never mutated after creation; re-chunking a document replaces the whole
/// set, with chunk ids renumbered from the same starting offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocAwareChunk {
  /// Monotonic within the owning document, no gaps
  pub chunk_id: usize,

  pub document_id: DocumentId,

  /// Semantic identifier of the owning document, kept for display
  pub semantic_identifier: String,

  /// Lead text of the document, for result snippets
  pub blurb: String,

  pub content: String,

  /// Character offset within `content` -> link of the section starting there.
  /// Lets partial content be attributed to the right source URL.
  pub source_links: BTreeMap<usize, String>,

  /// True when this chunk starts mid-section rather than at a boundary
  pub section_continuation: bool,

  /// Document title prepended to embedding input, when available
  pub title_prefix: Option<String>,

  /// Flattened metadata appended for keyword matching
  pub metadata_suffix: Option<String>,

  /// Finer-grained sub-texts for mini-chunk embedding, when enabled
  pub mini_chunk_texts: Option<Vec<String>>,
}

impl DocAwareChunk {
  /// Text handed to the embedder: title prefix + content + metadata suffix
  pub fn embeddable_text(&self) -> String {
    let mut text = String::new();
    if let Some(prefix) = &self.title_prefix {
      text.push_str(prefix);
    }
    text.push_str(&self.content);
    if let Some(suffix) = &self.metadata_suffix {
      text.push_str(suffix);
    }
    text
  }
}

/// Embedding vectors for one chunk: one full-chunk vector plus any
/// mini-chunk vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEmbedding {
  pub full: Vec<f32>,
  pub mini: Vec<Vec<f32>>,
}

/// Chunk plus its embedding, ready for the vector index. Ephemeral:
/// built per indexing run, never persisted outside the index backends.
#[derive(Debug, Clone)]
pub struct IndexChunk {
  pub chunk: DocAwareChunk,
  pub embedding: ChunkEmbedding,
}

pub const DEFAULT_BOOST: i32 = 0;

/// IndexChunk enriched with access and ranking metadata, the form the
/// vector index actually consumes
#[derive(Debug, Clone)]
pub struct DocMetadataAwareIndexChunk {
  pub chunk: IndexChunk,
  pub access_list: Vec<String>,
  pub document_sets: HashSet<String>,
  pub boost: i32,
}

impl DocMetadataAwareIndexChunk {
  pub fn from_index_chunk(
    chunk: IndexChunk,
    access_list: Vec<String>,
    document_sets: HashSet<String>,
    boost: i32,
  ) -> Self {
    Self {
      chunk,
      access_list,
      document_sets,
      boost,
    }
  }

  pub fn document_id(&self) -> &DocumentId {
    &self.chunk.chunk.document_id
  }

  pub fn chunk_id(&self) -> usize {
    self.chunk.chunk.chunk_id
  }
}

/// Result of inserting one chunk into an index backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInsertionRecord {
  pub document_id: DocumentId,
  pub store_id: String,
  pub already_existed: bool,
}

/// Count distinct documents newly introduced by a batch of insertions.
/// A document appears once per chunk but is counted at most once.
pub fn net_new_document_count(records: &[ChunkInsertionRecord]) -> usize {
  records
    .iter()
    .filter(|r| !r.already_existed)
    .map(|r| &r.document_id)
    .collect::<HashSet<_>>()
    .len()
}
