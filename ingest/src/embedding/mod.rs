use anyhow::Result;
use async_trait::async_trait;

pub mod openai;

pub use openai::OpenAiEmbeddings;

/// Computes embedding vectors for batches of chunk texts.
///
/// One call per batch; implementations are expected to retry transient
/// provider failures internally before surfacing an error.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;
}
