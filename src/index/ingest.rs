// Offline ingestion - embeds the operation catalog into the repository
use super::{IndexedOperation, SqliteEmbeddingsRepository};
use crate::{catalog::OperationCatalog, embedding::EmbeddingGenerator};
use anyhow::{Context, Result};

const PROGRESS_EVERY: usize = 50;

/// Embeds every catalog operation, then replaces the stored set with the
/// result. Operations no longer in the catalog are removed, and a failed
/// embedding leaves the previous contents untouched. Returns the number of
/// operations written.
pub async fn ingest_catalog(
    repository: &SqliteEmbeddingsRepository,
    catalog: &OperationCatalog,
    generator: &dyn EmbeddingGenerator,
) -> Result<usize> {
    let total = catalog.len();
    tracing::info!(total, model = generator.model_name(), "Embedding operation catalog");

    let mut indexed = Vec::with_capacity(total);
    for operation in catalog.iter() {
        let embedding = generator
            .generate(&operation.embedding_text())
            .await
            .with_context(|| format!("failed to embed {}", operation.operation_id))?;

        indexed.push(IndexedOperation {
            operation_id: operation.operation_id.clone(),
            summary: operation.summary.clone(),
            description: operation.description.clone(),
            embedding,
        });

        if indexed.len() % PROGRESS_EVERY == 0 {
            tracing::info!(done = indexed.len(), total, "Ingestion progress");
        }
    }

    repository.replace_all(&indexed).await?;

    tracing::info!(total, "Operation catalog ingested");
    Ok(total)
}
