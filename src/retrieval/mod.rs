// Stack Sage: Retrieval Subsystem
// Chunked Comprehensive Rules indexed twice: dense vectors for semantics,
// BM25 for keyword precision, fused by the hybrid retriever.

pub mod bm25;
pub mod chunker;
pub mod embedding;
pub mod retriever;
pub mod vector_store;

pub use bm25::Bm25Index;
pub use chunker::{chunk_rules, RuleChunk};
pub use embedding::{Embedder, HostedEmbedder, LocalHashEmbedder};
pub use retriever::{build_index, build_index_from_file, HybridRetriever};
pub use vector_store::{IndexMetadata, VectorIndex};
