pub mod chunker;
pub mod ledger;
pub mod pipeline;
pub mod traits;

pub use chunker::Chunker;
pub use ledger::MemoryLedger;
pub use pipeline::{IndexAttemptMetadata, IndexingResult, Pipeline};
pub use traits::{DocumentLedger, Embedder, KeywordIndex, VectorIndex};
