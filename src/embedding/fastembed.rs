// Local ONNX embeddings via fastembed
use super::{EmbeddingGenerator, EmbeddingGeneratorFactory};
use crate::errors::SearchError;
use anyhow::Result;
use async_trait::async_trait;
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Loads a fastembed model on the blocking pool.
pub struct FastEmbedFactory {
    model: EmbeddingModel,
    cache_dir: Option<PathBuf>,
}

impl FastEmbedFactory {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self::with_model(EmbeddingModel::BGEBaseENV15, cache_dir)
    }

    pub fn with_model(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> Self {
        Self { model, cache_dir }
    }
}

#[async_trait]
impl EmbeddingGeneratorFactory for FastEmbedFactory {
    async fn create(&self) -> Result<Arc<dyn EmbeddingGenerator>> {
        let generator = FastEmbedGenerator::load(self.model.clone(), self.cache_dir.clone()).await?;
        Ok(Arc::new(generator))
    }
}

pub struct FastEmbedGenerator {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    model_name: String,
}

impl FastEmbedGenerator {
    pub async fn load(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model_name = format!("{:?}", model);
        tracing::info!(model = %model_name, "Loading embedding model");

        let started = std::time::Instant::now();
        let text_embedding = tokio::task::spawn_blocking(move || {
            // Download progress would be written to stdout, which carries JSON-RPC.
            let mut options = InitOptions::new(model).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| SearchError::ModelLoad(format!("model loader task failed: {}", e)))?
        .map_err(|e| SearchError::ModelLoad(format!("failed to initialize {}: {}", model_name, e)))?;

        tracing::info!(
            model = %model_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding model ready"
        );

        Ok(Self {
            model: Arc::new(Mutex::new(Some(text_embedding))),
            model_name,
        })
    }
}

#[async_trait]
impl EmbeddingGenerator for FastEmbedGenerator {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Validation("cannot embed empty text".to_string()).into());
        }

        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock();
            let model = guard
                .as_mut()
                .ok_or_else(|| SearchError::ModelLoad("embedding model has been disposed".to_string()))?;
            model
                .embed(input, None)
                .map_err(|e| anyhow::anyhow!("embedding inference failed: {}", e))
        })
        .await??;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no embedding returned from fastembed"))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn dispose(&self) {
        if self.model.lock().take().is_some() {
            tracing::info!(model = %self.model_name, "Embedding model released");
        }
    }
}
