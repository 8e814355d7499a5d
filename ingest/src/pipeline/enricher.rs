use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::doctype::DocType;

use super::loader::RawDocument;

/// Provenance metadata attached to every chunk before it can be indexed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkMetadata {
    /// Canonical URL the chunk can be attributed to.
    pub source: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    /// RFC 3339 UTC timestamp taken at enrichment time.
    pub ingested_at: String,
    pub filename: String,
}

/// A bounded slice of one document's text, the atomic unit indexed and
/// retrieved.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Derives canonical provenance for chunks of one document family.
///
/// Pure aside from timestamp generation; supplies fallbacks instead of
/// rejecting a chunk when richer metadata is unavailable.
pub struct Enricher {
    doc_type: DocType,
    source_dir: PathBuf,
    base_url: String,
}

impl Enricher {
    pub fn new(doc_type: DocType, source_dir: &Path) -> Self {
        Self {
            doc_type,
            source_dir: source_dir.to_path_buf(),
            base_url: doc_type.docs_base_url(),
        }
    }

    pub fn enrich(&self, text: String, document: &RawDocument) -> Chunk {
        let filename = document
            .source_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();

        let title = document
            .category
            .clone()
            .or_else(|| first_heading(&text))
            .unwrap_or_else(|| filename.clone());

        Chunk {
            metadata: ChunkMetadata {
                source: self.canonical_url(&document.source_path, &filename),
                doc_type: self.doc_type.tag().to_string(),
                title,
                ingested_at: chrono::Utc::now().to_rfc3339(),
                filename,
            },
            text,
        }
    }

    /// Replaces the local source-directory prefix with the external docs
    /// base, e.g. `next-docs-raw-data/intro.mdx` -> `https://nextjs-docs/intro.mdx`.
    fn canonical_url(&self, source_path: &Path, filename: &str) -> String {
        let relative = source_path
            .strip_prefix(&self.source_dir)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| filename.to_string());
        format!("{}/{}", self.base_url, relative)
    }
}

/// First Markdown-style heading line in the chunk text, stripped of its
/// `#` markers.
fn first_heading(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            return None;
        }
        let heading = trimmed.trim_start_matches('#').trim();
        if heading.is_empty() {
            None
        } else {
            Some(heading.to_string())
        }
    })
}
