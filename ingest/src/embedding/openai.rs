use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tracing::warn;

use crate::config::EmbeddingSettings;

use super::EmbeddingProvider;

/// Embeddings client for OpenAI-compatible `/v1/embeddings` endpoints.
pub struct OpenAiEmbeddings {
    http: Client,
    api_key: String,
    base: String,
    model: String,
    dimension: usize,
    max_retries: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, settings: &EmbeddingSettings) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!settings.model.trim().is_empty(), "missing embedding model name");
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build embeddings HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            max_retries: settings.max_retries.max(1),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut delay = Duration::from_millis(300);
        let mut attempt = 0usize;
        loop {
            let response = self
                .http
                .post(format!("{}/v1/embeddings", self.base))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .context("failed to parse embedding response")?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        anyhow::ensure!(
                            parsed.data.len() == inputs.len(),
                            "provider returned {} embeddings for {} inputs",
                            parsed.data.len(),
                            inputs.len()
                        );
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    let body_text = resp.text().await.unwrap_or_default();
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request throttled, backing off");
                        sleep(delay).await;
                        delay = next_delay(delay);
                        continue;
                    }
                    anyhow::bail!("embedding request failed ({status}): {body_text}");
                }
                Err(err) => {
                    if is_transient(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request failed, backing off");
                        sleep(delay).await;
                        delay = next_delay(delay);
                        continue;
                    }
                    return Err(anyhow::Error::new(err).context("embedding request failed"));
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn next_delay(delay: Duration) -> Duration {
    Duration::from_millis((delay.as_millis() as f64 * 1.8) as u64)
        + Duration::from_millis(fastrand::u64(0..250))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
