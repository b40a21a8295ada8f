// Remote embeddings service client
use super::{EmbeddingGenerator, EmbeddingGeneratorFactory};
use crate::errors::SearchError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub struct HttpEmbeddingFactory {
    base_url: String,
    timeout: Duration,
}

impl HttpEmbeddingFactory {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EmbeddingGeneratorFactory for HttpEmbeddingFactory {
    async fn create(&self) -> Result<Arc<dyn EmbeddingGenerator>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SearchError::ModelLoad(format!("failed to build HTTP client: {}", e)))?;
        Ok(Arc::new(HttpEmbeddingGenerator {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            client,
        }))
    }
}

/// Calls `POST {base_url}/embed` on an embeddings service.
pub struct HttpEmbeddingGenerator {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    dimension: Option<usize>,
}

#[async_trait]
impl EmbeddingGenerator for HttpEmbeddingGenerator {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Validation("cannot embed empty text".to_string()).into());
        }

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .context("embeddings request failed")?;

        if !response.status().is_success() {
            bail!("embeddings service returned {}", response.status());
        }

        let result: EmbedResponse = response
            .json()
            .await
            .context("failed to parse embeddings response")?;

        if let Some(dimension) = result.dimension {
            if dimension != result.embedding.len() {
                bail!(
                    "embeddings service reported dimension {} but returned {} values",
                    dimension,
                    result.embedding.len()
                );
            }
        }

        Ok(result.embedding)
    }

    fn model_name(&self) -> &str {
        "http"
    }
}
