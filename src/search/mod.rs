// Semantic Search Module
pub mod service;

pub use service::{cache_key, GeneratorState, SemanticSearchService};

use crate::{
    cache::QueryCache,
    config::McpConfig,
    embedding,
    index::SqliteEmbeddingsRepository,
    logging::EventLog,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Wires the cache, embeddings repository and embedding factory from config.
/// The embedding model itself is only loaded on the first search.
pub async fn build_search_service(config: &McpConfig, events: Arc<dyn EventLog>) -> Result<Arc<SemanticSearchService>> {
    let cache = QueryCache::new(&config.cache, Arc::clone(&events)).context("invalid search cache configuration")?;

    let repository = SqliteEmbeddingsRepository::open(&config.embeddings_db_path)
        .await
        .with_context(|| format!("failed to open {}", config.embeddings_db_path.display()))?;
    let stored = repository.count().await?;
    if stored == 0 {
        tracing::warn!(
            path = %config.embeddings_db_path.display(),
            "Embeddings database is empty; run the ingest command first"
        );
    } else {
        tracing::info!(operations = stored, "Embeddings database opened");
    }

    let factory = embedding::factory_from_config(&config.embedding)?;

    Ok(Arc::new(SemanticSearchService::new(
        factory,
        Arc::new(repository),
        Arc::new(cache),
        config.search.clone(),
        events,
    )))
}
