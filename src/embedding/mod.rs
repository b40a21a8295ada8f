//! Text embedding generation.
//!
//! Model lifecycle and inference are split: an [`EmbeddingGeneratorFactory`]
//! performs the expensive model load, and the resulting [`EmbeddingGenerator`]
//! only turns text into vectors. The search service memoizes the generator.

mod fastembed;
mod http;

pub use self::fastembed::{FastEmbedFactory, FastEmbedGenerator};
pub use self::http::{HttpEmbeddingFactory, HttpEmbeddingGenerator};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Dimension of the default local model (BGE base, English v1.5).
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embeds a single non-empty text.
    async fn generate(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;

    /// Releases model resources. Generation afterwards fails.
    async fn dispose(&self) {}
}

#[async_trait]
pub trait EmbeddingGeneratorFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn EmbeddingGenerator>>;
}

pub fn factory_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGeneratorFactory>> {
    match config.provider {
        EmbeddingProvider::FastEmbed => Ok(Arc::new(FastEmbedFactory::new(config.cache_dir.clone()))),
        EmbeddingProvider::Http => {
            let url = config
                .service_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMBEDDINGS_SERVICE_URL is not set"))?;
            Ok(Arc::new(HttpEmbeddingFactory::new(url)))
        }
    }
}
