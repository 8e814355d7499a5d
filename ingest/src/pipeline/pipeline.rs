use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use futures::{StreamExt, future, stream};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{config::Settings, doctype::DocType, embedding::EmbeddingProvider, index::VectorIndex};

use super::{
    batcher,
    chunker::{Chunker, RecursiveChunker},
    enricher::{Chunk, Enricher},
    loader,
};

/// Stages of one ingestion run. `Failed` is reachable only from
/// `Validating`; later stages skip failing units instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Loading,
    Chunking,
    Enriching,
    Indexing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Validating => "validating",
            RunState::Loading => "loading",
            RunState::Chunking => "chunking",
            RunState::Enriching => "enriching",
            RunState::Indexing => "indexing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub doc_type: String,
    pub total_loaded: usize,
    pub total_chunks: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
}

/// Sequences loading, chunking, enrichment, embedding, and upserting for one
/// document type, and aggregates per-batch outcomes.
pub struct IngestPipeline {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    settings: Settings,
}

impl IngestPipeline {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let chunker = Arc::new(RecursiveChunker::with_defaults(
            settings.chunk_size,
            settings.chunk_overlap,
        )?);
        Ok(Self::with_chunker(settings, chunker, embedder, index))
    }

    pub fn with_chunker(
        settings: Settings,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            settings,
        }
    }

    /// Runs the full pipeline for `doc_type`. Setting `cancel` stops new
    /// batches from starting; in-flight batches complete.
    pub async fn run(&self, doc_type: DocType, cancel: Arc<AtomicBool>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let mut state = RunState::Validating;
        info!(%run_id, %doc_type, %state, "starting ingestion run");

        let source_dir = self.settings.source_root.join(doc_type.source_dir());
        if let Err(err) = self.validate(&source_dir).await {
            state = RunState::Failed;
            error!(%run_id, %doc_type, %state, error = %err, "run validation failed");
            return Err(err);
        }

        state = advance(state, RunState::Loading, run_id);
        let documents = loader::load_documents(doc_type, &source_dir).await?;
        let total_loaded = documents.len();

        state = advance(state, RunState::Chunking, run_id);
        let mut pieces: Vec<(usize, Vec<String>)> = Vec::with_capacity(documents.len());
        for (doc_index, document) in documents.iter().enumerate() {
            match self.chunker.chunk(&document.content) {
                Ok(texts) => pieces.push((doc_index, texts)),
                Err(err) => {
                    warn!(
                        path = %document.source_path.display(),
                        error = %err,
                        "failed to chunk document, skipping"
                    );
                }
            }
        }
        let total_chunks: usize = pieces.iter().map(|(_, texts)| texts.len()).sum();
        info!(%run_id, total_loaded, total_chunks, "split documents into chunks");

        state = advance(state, RunState::Enriching, run_id);
        let enricher = Enricher::new(doc_type, &source_dir);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .flat_map(|(doc_index, texts)| {
                let document = &documents[doc_index];
                texts
                    .into_iter()
                    .map(|text| enricher.enrich(text, document))
                    .collect::<Vec<_>>()
            })
            .collect();

        state = advance(state, RunState::Indexing, run_id);
        let namespace = doc_type.namespace();
        let batches = batcher::partition(&chunks, self.settings.batch_size);
        let total_batches = batches.len();

        let outcomes: Vec<(usize, Result<()>)> = stream::iter(batches)
            .take_while(|_| future::ready(!cancel.load(Ordering::Relaxed)))
            .map(|(start_index, slice)| {
                let namespace = namespace.as_str();
                async move {
                    let result = self
                        .index_batch(doc_type, namespace, start_index, slice)
                        .await;
                    (start_index, result)
                }
            })
            .buffer_unordered(self.settings.max_inflight_batches.max(1))
            .collect()
            .await;

        let mut batches_succeeded = 0usize;
        let mut batches_failed = 0usize;
        for (start_index, outcome) in outcomes {
            match outcome {
                Ok(()) => batches_succeeded += 1,
                Err(err) => {
                    batches_failed += 1;
                    error!(
                        %run_id,
                        batch_start = start_index,
                        error = %err,
                        "batch failed, continuing with remaining batches"
                    );
                }
            }
        }

        if cancel.load(Ordering::Relaxed) {
            let skipped = total_batches - batches_succeeded - batches_failed;
            warn!(%run_id, skipped, "cancellation requested, skipped remaining batches");
        }

        state = advance(state, RunState::Completed, run_id);
        let summary = RunSummary {
            doc_type: doc_type.tag().to_string(),
            total_loaded,
            total_chunks,
            batches_succeeded,
            batches_failed,
        };
        info!(
            %run_id,
            %state,
            total_loaded = summary.total_loaded,
            total_chunks = summary.total_chunks,
            batches_succeeded = summary.batches_succeeded,
            batches_failed = summary.batches_failed,
            "ingestion run finished"
        );
        Ok(summary)
    }

    /// Run-level preconditions, checked before any stage starts I/O.
    async fn validate(&self, source_dir: &std::path::Path) -> Result<()> {
        anyhow::ensure!(
            source_dir.is_dir(),
            "source directory {} does not exist",
            source_dir.display()
        );
        self.index
            .ensure_index(self.embedder.dimension())
            .await
            .context("failed to ensure vector index exists")
    }

    async fn index_batch(
        &self,
        doc_type: DocType,
        namespace: &str,
        start_index: usize,
        chunks: &[Chunk],
    ) -> Result<()> {
        let batch =
            batcher::embed_batch(self.embedder.as_ref(), doc_type.tag(), start_index, chunks)
                .await?;
        self.index
            .upsert(namespace, &batch.records)
            .await
            .with_context(|| format!("upsert of batch starting at offset {start_index} failed"))?;
        info!(
            batch_start = batch.start_index,
            vectors = batch.records.len(),
            namespace,
            "upserted batch"
        );
        Ok(())
    }
}

fn advance(from: RunState, to: RunState, run_id: Uuid) -> RunState {
    info!(%run_id, from = %from, to = %to, "stage transition");
    to
}
