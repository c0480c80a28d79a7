//! Broker vector crate - query embeddings, the embedding cache, and property search.
//!
//! Provides an embedding service trait with an OpenAI-backed implementation
//! and a deterministic mock for tests, a bounded FIFO cache of query vectors,
//! and the search engine that hard-filters the catalog and ranks the survivors
//! by cosine similarity.

pub mod cache;
pub mod embedding;
pub mod search;

pub use cache::EmbeddingCache;
pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OpenAiEmbeddingService};
pub use search::{apply_hard_filters, cosine_similarity, FilterStage, PropertySearchEngine, SearchCriteria};
