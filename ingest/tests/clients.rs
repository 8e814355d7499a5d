use std::{sync::Arc, time::Duration};

use anyhow::Result;
use httpmock::prelude::*;
use ingest::{
    config::{EmbeddingSettings, IndexSettings},
    embedding::{EmbeddingProvider, OpenAiEmbeddings},
    index::{PineconeIndex, VectorIndex},
};
use serde_json::json;

fn embedding_settings(server: &MockServer) -> EmbeddingSettings {
    EmbeddingSettings {
        base_url: server.base_url(),
        max_retries: 3,
        timeout_secs: 5,
        ..EmbeddingSettings::default()
    }
}

fn index_settings(server: &MockServer) -> IndexSettings {
    IndexSettings {
        control_base_url: server.base_url(),
        max_retries: 3,
        timeout_secs: 5,
        ..IndexSettings::default()
    }
}

#[tokio::test]
async fn throttled_embedding_request_is_retried_until_it_succeeds() -> Result<()> {
    let server = MockServer::start_async().await;
    let mut throttled = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(429).body("rate limited");
        })
        .await;

    let provider = Arc::new(OpenAiEmbeddings::new(
        "test-key".into(),
        &embedding_settings(&server),
    )?);
    let inputs: Vec<String> = vec!["alpha".into(), "beta".into()];
    let call = {
        let provider = Arc::clone(&provider);
        let inputs = inputs.clone();
        tokio::spawn(async move { provider.embed_batch(&inputs).await })
    };

    // Swap in a healthy endpoint while the client is backing off, so the
    // next attempt lands on it.
    while throttled.hits_async().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    throttled.delete_async().await;
    let healthy = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "data": [
                    {"embedding": [1.0, 0.0, 0.0], "index": 0},
                    {"embedding": [0.0, 1.0, 0.0], "index": 1},
                ]
            }));
        })
        .await;

    let embeddings = call.await??;
    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(embeddings[1], vec![0.0, 1.0, 0.0]);
    healthy.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn embedding_retries_stop_at_the_attempt_budget() -> Result<()> {
    let server = MockServer::start_async().await;
    let throttled = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(429).body("rate limited");
        })
        .await;

    let mut settings = embedding_settings(&server);
    settings.max_retries = 2;
    let provider = OpenAiEmbeddings::new("test-key".into(), &settings)?;
    let inputs = vec!["alpha".to_string()];

    let err = provider.embed_batch(&inputs).await.unwrap_err();
    assert!(err.to_string().contains("429"), "unexpected error: {err:#}");
    assert_eq!(throttled.hits_async().await, 2);
    Ok(())
}

#[tokio::test]
async fn out_of_order_embedding_rows_are_restored_to_input_order() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0},
                ]
            }));
        })
        .await;

    let provider = OpenAiEmbeddings::new("test-key".into(), &embedding_settings(&server))?;
    let inputs = vec!["first".to_string(), "second".to_string()];
    let embeddings = provider.embed_batch(&inputs).await?;
    assert_eq!(embeddings[0], vec![1.0, 0.0]);
    assert_eq!(embeddings[1], vec![0.0, 1.0]);
    Ok(())
}

#[tokio::test]
async fn create_conflict_counts_as_an_existing_index() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes");
            then.status(200).json_body(json!({"indexes": []}));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/indexes").header("api-key", "test-key");
            then.status(409).json_body(json!({
                "error": {"code": "ALREADY_EXISTS", "message": "index already exists"}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes/docs-index");
            then.status(200).json_body(json!({"host": "docs-index.example.test"}));
        })
        .await;

    let index = PineconeIndex::new("test-key".into(), &index_settings(&server))?;
    index.ensure_index(3).await?;
    create.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn listed_index_is_not_recreated() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes");
            then.status(200)
                .json_body(json!({"indexes": [{"name": "docs-index"}]}));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/indexes");
            then.status(500).body("should never be called");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes/docs-index");
            then.status(200).json_body(json!({"host": "docs-index.example.test"}));
        })
        .await;

    let index = PineconeIndex::new("test-key".into(), &index_settings(&server))?;
    index.ensure_index(3).await?;
    assert_eq!(create.hits_async().await, 0);
    Ok(())
}
