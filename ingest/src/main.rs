use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use ingest::{
    config::{Credentials, Settings},
    doctype::DocType,
    embedding::OpenAiEmbeddings,
    index::PineconeIndex,
    pipeline::{IngestPipeline, RunSummary},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ingest one documentation family into the vector index.
#[derive(Parser)]
#[command(name = "ingest", version, about)]
struct Cli {
    /// Documentation family to ingest
    #[arg(value_enum)]
    doc_type: DocType,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli.doc_type).await {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "ingestion failed");
            eprintln!("ingestion failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(doc_type: DocType) -> Result<RunSummary> {
    dotenv().ok();
    let credentials = Credentials::from_env()?;
    let settings = Settings::load().await?;

    let embedder = Arc::new(OpenAiEmbeddings::new(
        credentials.openai_api_key.clone(),
        &settings.embedding,
    )?);
    let index = Arc::new(PineconeIndex::new(
        credentials.pinecone_api_key.clone(),
        &settings.index,
    )?);
    let pipeline = IngestPipeline::new(settings, embedder, index)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, finishing in-flight batches");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    pipeline.run(doc_type, cancel).await
}

fn report(summary: &RunSummary) {
    println!(
        "{}: loaded {} documents, produced {} chunks, upserted {} batches, {} batches failed",
        summary.doc_type,
        summary.total_loaded,
        summary.total_chunks,
        summary.batches_succeeded,
        summary.batches_failed
    );
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
