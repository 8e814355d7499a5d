use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/ingest.yaml";

/// Run settings. Every knob the orchestrator needs is carried here rather
/// than read from process-wide state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    /// How many embed+upsert batches may be in flight at once.
    pub max_inflight_batches: usize,
    /// Directory the per-type source directories live under.
    pub source_root: PathBuf,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub name: String,
    pub control_base_url: String,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            batch_size: 100,
            max_inflight_batches: 4,
            source_root: PathBuf::from("."),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            model: "text-embedding-3-small".into(),
            dimension: 1536,
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "docs-index".into(),
            control_base_url: "https://api.pinecone.io".into(),
            metric: "cosine".into(),
            cloud: "aws".into(),
            region: "us-east-1".into(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Loads settings from the YAML file at `INGEST_CONFIG_PATH` (or the
    /// default location). A missing file yields the defaults; a present but
    /// malformed file is an error.
    pub async fn load() -> Result<Self> {
        let path = config_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let settings: Settings = serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
                info!(path = %path.display(), "Configuration loaded from disk");
                Ok(settings)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file found, using defaults");
                Ok(Settings::default())
            }
            Err(err) => Err(err)
                .with_context(|| format!("Failed to read config file at {}", path.display())),
        }
    }
}

fn config_path() -> PathBuf {
    env::var("INGEST_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Service credentials, required before any I/O stage starts.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub pinecone_api_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let openai_api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let pinecone_api_key =
            env::var("PINECONE_API_KEY").context("PINECONE_API_KEY is not set")?;
        Ok(Self {
            openai_api_key,
            pinecone_api_key,
        })
    }
}
