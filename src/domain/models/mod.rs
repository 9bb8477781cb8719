pub mod cache;
pub mod config;
pub mod document;
pub mod embedding;
pub mod search;

pub use cache::CacheEntry;
pub use config::{
    BudgetConfig, CacheConfig, Config, DatabaseConfig, EncoderConfig, LoggingConfig,
    SamplingConfig, SearchConfig,
};
pub use document::{ContentHash, DocumentKind, DocumentRecord};
pub use embedding::{bytes_to_embedding, embedding_to_bytes, squared_l2, EmbeddingModelKind};
pub use search::{
    DistanceMetric, IndexSpec, KnnMatch, ScoredDocument, SearchHit, SearchResponse, SearchScope,
    SearchSource, VectorSearchQuery,
};
