pub mod batcher;
pub mod chunker;
pub mod enricher;
pub mod loader;
pub mod pipeline;

pub use batcher::EmbeddingBatch;
pub use chunker::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker};
pub use enricher::{Chunk, ChunkMetadata, Enricher};
pub use loader::{RawDocument, load_documents};
pub use pipeline::{IngestPipeline, RunState, RunSummary};
