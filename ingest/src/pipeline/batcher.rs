use anyhow::{Context, Result};
use serde_json::json;

use crate::{embedding::EmbeddingProvider, index::VectorRecord};

use super::enricher::Chunk;

/// A contiguous run of chunks paired with their embeddings and
/// deterministic identifiers, ready for one upsert call.
pub struct EmbeddingBatch {
    /// Global offset of the batch's first chunk.
    pub start_index: usize,
    pub records: Vec<VectorRecord>,
}

/// Partitions the enriched chunk sequence into contiguous, order-preserving
/// batches tagged with their starting offsets.
pub fn partition(chunks: &[Chunk], batch_size: usize) -> Vec<(usize, &[Chunk])> {
    chunks
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(i, slice)| (i * batch_size.max(1), slice))
        .collect()
}

/// Embeds one batch and assembles its vector records.
///
/// Identifiers follow `{doc_type}_{batch_start}_{offset}`, so re-running
/// ingestion over an unchanged source set overwrites prior vectors instead
/// of duplicating them.
pub async fn embed_batch(
    provider: &dyn EmbeddingProvider,
    doc_tag: &str,
    start_index: usize,
    chunks: &[Chunk],
) -> Result<EmbeddingBatch> {
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = provider
        .embed_batch(&texts)
        .await
        .with_context(|| format!("embedding batch starting at offset {start_index} failed"))?;

    let mut records = Vec::with_capacity(chunks.len());
    for (offset, (chunk, values)) in chunks.iter().zip(vectors).enumerate() {
        // A chunk without provenance must never be silently indexed.
        anyhow::ensure!(
            !chunk.metadata.source.is_empty(),
            "chunk at offset {} has no source URL",
            start_index + offset
        );
        let mut metadata = serde_json::to_value(&chunk.metadata)
            .context("failed to serialize chunk metadata")?;
        metadata["text"] = json!(chunk.text);

        records.push(VectorRecord {
            id: format!("{doc_tag}_{start_index}_{offset}"),
            values,
            metadata,
        });
    }

    Ok(EmbeddingBatch {
        start_index,
        records,
    })
}
