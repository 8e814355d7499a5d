use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_json::json;
use tokio::{
    sync::OnceCell,
    time::{Duration, sleep},
};
use tracing::{info, warn};

use crate::config::IndexSettings;

use super::{VectorIndex, VectorRecord};

/// Serverless vector index client speaking the Pinecone HTTP API: control
/// plane for list/create/describe, data plane for upserts.
pub struct PineconeIndex {
    http: Client,
    control_base: String,
    index_name: String,
    metric: String,
    cloud: String,
    region: String,
    max_retries: usize,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(api_key: String, settings: &IndexSettings) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing vector index API key");
        anyhow::ensure!(!settings.name.trim().is_empty(), "missing index name");

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).context("invalid vector index API key")?,
        );
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build vector index HTTP client")?;

        Ok(Self {
            http,
            control_base: settings.control_base_url.trim_end_matches('/').to_string(),
            index_name: settings.name.clone(),
            metric: settings.metric.clone(),
            cloud: settings.cloud.clone(),
            region: settings.region.clone(),
            max_retries: settings.max_retries.max(1),
            host: OnceCell::new(),
        })
    }

    async fn index_exists(&self) -> Result<bool> {
        let listing: IndexList = self
            .get_json(&format!("{}/indexes", self.control_base))
            .await
            .context("failed to list indexes")?;
        Ok(listing
            .indexes
            .iter()
            .any(|index| index.name == self.index_name))
    }

    async fn create_index(&self, dimension: usize) -> Result<()> {
        let body = json!({
            "name": self.index_name,
            "dimension": dimension,
            "metric": self.metric,
            "spec": {
                "serverless": {
                    "cloud": self.cloud,
                    "region": self.region,
                }
            }
        });

        let resp = self
            .http
            .post(format!("{}/indexes", self.control_base))
            .json(&body)
            .send()
            .await
            .context("create index request failed")?;

        let status = resp.status();
        // Another run racing us to create the index is fine.
        if status == StatusCode::CONFLICT {
            info!(index = %self.index_name, "index already created concurrently");
            return Ok(());
        }
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("create index failed ({status}): {body_text}");
        }
        info!(index = %self.index_name, dimension, metric = %self.metric, "created index");
        Ok(())
    }

    async fn data_plane_host(&self) -> Result<&str> {
        self.host
            .get_or_try_init(|| async {
                let described: IndexDescription = self
                    .get_json(&format!("{}/indexes/{}", self.control_base, self.index_name))
                    .await
                    .with_context(|| format!("failed to describe index {}", self.index_name))?;
                Ok(described.host)
            })
            .await
            .map(String::as_str)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("request to {url} failed ({status}): {body_text}");
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("failed to parse response from {url}"))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_index(&self, dimension: usize) -> Result<()> {
        if !self.index_exists().await? {
            self.create_index(dimension).await?;
        }
        self.data_plane_host().await?;
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let host = self.data_plane_host().await?;
        let url = format!("https://{host}/vectors/upsert");
        let body = json!({
            "vectors": records,
            "namespace": namespace,
        });

        let mut delay = Duration::from_millis(300);
        let mut attempt = 0usize;
        loop {
            let response = self.http.post(&url).json(&body).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let body_text = resp.text().await.unwrap_or_default();
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, namespace, "upsert throttled, backing off");
                        sleep(delay).await;
                        delay = next_delay(delay);
                        continue;
                    }
                    anyhow::bail!("upsert failed ({status}): {body_text}");
                }
                Err(err) => {
                    if is_transient(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, namespace, "upsert failed, backing off");
                        sleep(delay).await;
                        delay = next_delay(delay);
                        continue;
                    }
                    return Err(anyhow::Error::new(err).context("upsert request failed"));
                }
            }
        }
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

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}
