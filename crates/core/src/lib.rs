pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod pair;

pub use chunk::{
  ChunkEmbedding, ChunkInsertionRecord, DEFAULT_BOOST, DocAwareChunk, DocMetadataAwareIndexChunk, IndexChunk,
  net_new_document_count,
};
pub use config::{ChunkingConfig, Config, CoordinatorConfig};
pub use document::{Document, DocumentId, Section, SourceType};
pub use error::{Error, Result};
pub use pair::{CcPairId, CcPairStatus, ConnectorCredentialPair, SearchConfigId, SyncKind};
