use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub mod pinecone;

pub use pinecone::PineconeIndex;

/// One indexed vector: a deterministic identifier, the embedding, and the
/// provenance metadata the retrieval collaborator cites from.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

/// Namespaced vector index. Upsert is idempotent by identifier: writing the
/// same id again overwrites the prior vector and metadata.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Verifies the index exists, creating it with the given dimensionality
    /// if absent. Called once per run before any batch is written. A
    /// concurrent-creation conflict counts as success.
    async fn ensure_index(&self, dimension: usize) -> Result<()>;

    /// Writes all records to the namespace in one call.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;
}
