use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use ingest::{
    config::Settings,
    doctype::DocType,
    embedding::EmbeddingProvider,
    index::{VectorIndex, VectorRecord},
    pipeline::{
        IngestPipeline, batcher,
        enricher::{Chunk, ChunkMetadata, Enricher},
        loader::{self, RawDocument},
    },
};
use tempfile::TempDir;

/// In-memory embedding provider; optionally fails exactly one call.
struct FakeEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl FakeEmbedder {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    fn failing_on(dimension: usize, call: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_on_call: Some(call),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            anyhow::bail!("simulated provider failure on call {call}");
        }
        Ok(inputs
            .iter()
            .map(|text| vec![text.chars().count() as f32; self.dimension])
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// In-memory namespaced vector index keyed by identifier.
#[derive(Default)]
struct FakeIndex {
    ensure_calls: AtomicUsize,
    store: Mutex<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl FakeIndex {
    fn ids(&self, namespace: &str) -> HashSet<String> {
        self.store
            .lock()
            .expect("index lock")
            .get(namespace)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn count(&self, namespace: &str) -> usize {
        self.ids(namespace).len()
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn ensure_index(&self, _dimension: usize) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        let mut store = self.store.lock().expect("index lock");
        let entries = store.entry(namespace.to_string()).or_default();
        for record in records {
            entries.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }
}

fn test_settings(source_root: &Path, batch_size: usize) -> Settings {
    Settings {
        batch_size,
        max_inflight_batches: 1,
        source_root: source_root.to_path_buf(),
        ..Settings::default()
    }
}

async fn write_react_docs(root: &Path, count: usize) -> Result<PathBuf> {
    let dir = root.join("react-docs-raw-data");
    tokio::fs::create_dir_all(&dir).await?;
    for i in 0..count {
        let body = format!("<html><body><h1>Doc {i}</h1><p>Short page body {i}.</p></body></html>");
        tokio::fs::write(dir.join(format!("doc-{i:02}.html")), body).await?;
    }
    Ok(dir)
}

fn not_cancelled() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[tokio::test]
async fn loader_skips_corrupt_files_without_aborting() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = write_react_docs(tmp.path(), 9).await?;
    tokio::fs::write(dir.join("broken.html"), [0xff_u8, 0xfe, 0x01]).await?;
    tokio::fs::write(dir.join("notes.txt"), "not a supported format").await?;

    let documents = loader::load_documents(DocType::React, &dir).await?;
    assert_eq!(documents.len(), 9);
    Ok(())
}

#[tokio::test]
async fn loader_fails_when_source_directory_is_missing() {
    let tmp = TempDir::new().expect("tempdir");
    let missing = tmp.path().join("react-docs-raw-data");
    let result = loader::load_documents(DocType::React, &missing).await;
    assert!(result.is_err());
}

#[test]
fn source_url_replaces_local_prefix_with_docs_base() {
    let enricher = Enricher::new(DocType::Nextjs, Path::new("next-docs-raw-data"));
    let document = RawDocument {
        content: "# Introduction\n\nNext.js basics.".to_string(),
        source_path: PathBuf::from("next-docs-raw-data/intro.mdx"),
        category: None,
    };

    let chunk = enricher.enrich(document.content.clone(), &document);
    assert_eq!(chunk.metadata.source, "https://nextjs-docs/intro.mdx");
    assert_eq!(chunk.metadata.doc_type, "Nextjs");
    assert_eq!(chunk.metadata.title, "Introduction");
    assert_eq!(chunk.metadata.filename, "intro.mdx");
    assert!(!chunk.metadata.ingested_at.is_empty());
}

#[test]
fn title_prefers_category_then_heading_then_filename() {
    let enricher = Enricher::new(DocType::Ai, Path::new("ai-docs-raw-data"));

    let with_category = RawDocument {
        content: "body".to_string(),
        source_path: PathBuf::from("ai-docs-raw-data/streaming.mdx"),
        category: Some("Streaming".to_string()),
    };
    let chunk = enricher.enrich("# Something else".to_string(), &with_category);
    assert_eq!(chunk.metadata.title, "Streaming");

    let plain = RawDocument {
        content: "no headings here".to_string(),
        source_path: PathBuf::from("ai-docs-raw-data/plain.mdx"),
        category: None,
    };
    let chunk = enricher.enrich(plain.content.clone(), &plain);
    assert_eq!(chunk.metadata.title, "plain.mdx");
}

fn make_chunk(i: usize) -> Chunk {
    Chunk {
        text: format!("chunk text {i}"),
        metadata: ChunkMetadata {
            source: format!("https://react-docs/page-{i}.html"),
            doc_type: "React".to_string(),
            title: format!("Page {i}"),
            ingested_at: "2024-01-01T00:00:00+00:00".to_string(),
            filename: format!("page-{i}.html"),
        },
    }
}

#[tokio::test]
async fn batch_identifiers_are_deterministic() -> Result<()> {
    let chunks: Vec<Chunk> = (0..400).map(make_chunk).collect();
    let batches = batcher::partition(&chunks, 100);
    assert_eq!(batches.len(), 4);
    let (start, slice) = batches[3];
    assert_eq!(start, 300);

    let embedder = FakeEmbedder::new(8);
    let batch = batcher::embed_batch(&embedder, "React", start, slice).await?;

    assert_eq!(batch.records.len(), 100);
    assert_eq!(batch.records[0].id, "React_300_0");
    assert_eq!(batch.records[99].id, "React_300_99");
    for (offset, record) in batch.records.iter().enumerate() {
        assert_eq!(record.id, format!("React_300_{offset}"));
        assert_eq!(record.metadata["type"], "React");
        assert!(record.metadata["text"].is_string());
    }
    Ok(())
}

#[tokio::test]
async fn chunk_without_source_is_rejected() {
    let mut chunk = make_chunk(0);
    chunk.metadata.source.clear();
    let embedder = FakeEmbedder::new(4);
    let result = batcher::embed_batch(&embedder, "React", 0, &[chunk]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn failed_batch_is_isolated_and_run_completes() -> Result<()> {
    let tmp = TempDir::new()?;
    write_react_docs(tmp.path(), 10).await?;

    // 10 one-chunk documents with batch size 2: five batches, the third
    // embedding call fails.
    let embedder = Arc::new(FakeEmbedder::failing_on(8, 3));
    let index = Arc::new(FakeIndex::default());
    let pipeline = IngestPipeline::new(
        test_settings(tmp.path(), 2),
        embedder.clone(),
        index.clone(),
    )?;

    let summary = pipeline.run(DocType::React, not_cancelled()).await?;

    assert_eq!(summary.total_loaded, 10);
    assert_eq!(summary.total_chunks, 10);
    assert_eq!(summary.batches_succeeded, 4);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(index.count("react"), 8);
    assert_eq!(index.ensure_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn reingesting_unchanged_sources_is_idempotent() -> Result<()> {
    let tmp = TempDir::new()?;
    write_react_docs(tmp.path(), 10).await?;
    let index = Arc::new(FakeIndex::default());

    let first = IngestPipeline::new(
        test_settings(tmp.path(), 2),
        Arc::new(FakeEmbedder::new(8)),
        index.clone(),
    )?;
    first.run(DocType::React, not_cancelled()).await?;
    let ids_after_first = index.ids("react");
    assert_eq!(ids_after_first.len(), 10);

    let second = IngestPipeline::new(
        test_settings(tmp.path(), 2),
        Arc::new(FakeEmbedder::new(8)),
        index.clone(),
    )?;
    second.run(DocType::React, not_cancelled()).await?;

    assert_eq!(index.ids("react"), ids_after_first);
    assert_eq!(index.count("react"), 10);
    Ok(())
}

#[tokio::test]
async fn missing_source_directory_fails_the_run() -> Result<()> {
    let tmp = TempDir::new()?;
    let pipeline = IngestPipeline::new(
        test_settings(tmp.path(), 2),
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(FakeIndex::default()),
    )?;

    let result = pipeline.run(DocType::React, not_cancelled()).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_new_batches() -> Result<()> {
    let tmp = TempDir::new()?;
    write_react_docs(tmp.path(), 10).await?;
    let index = Arc::new(FakeIndex::default());
    let pipeline = IngestPipeline::new(
        test_settings(tmp.path(), 2),
        Arc::new(FakeEmbedder::new(8)),
        index.clone(),
    )?;

    let cancel = Arc::new(AtomicBool::new(true));
    let summary = pipeline.run(DocType::React, cancel).await?;

    assert_eq!(summary.batches_succeeded, 0);
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(index.count("react"), 0);
    Ok(())
}
