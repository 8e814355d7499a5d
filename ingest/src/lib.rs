//! Ingestion and vector-indexing pipeline for scraped documentation.
//!
//! Raw documentation dumps are loaded per document family, split into
//! bounded overlapping chunks, enriched with provenance metadata, embedded
//! in batches, and upserted into a namespaced vector index under
//! deterministic identifiers, so re-running ingestion overwrites rather
//! than duplicates.

pub mod config;
pub mod doctype;
pub mod embedding;
pub mod html;
pub mod index;
pub mod pipeline;

pub use config::{Credentials, Settings};
pub use doctype::DocType;
pub use pipeline::{IngestPipeline, RunSummary};
