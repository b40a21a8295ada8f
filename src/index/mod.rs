//! Vector index over precomputed operation embeddings.
//!
//! Ranking uses full cosine similarity so stored vectors need not be unit
//! length. Results are ordered by descending score; equal scores keep catalog
//! order.

mod ingest;
mod sqlite;

pub use ingest::ingest_catalog;
pub use sqlite::SqliteEmbeddingsRepository;

use crate::{errors::SearchError, schema::SearchResult};
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns at most `limit` operations ranked by similarity to `query_vector`.
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
}

/// Stored embedding for one catalog operation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedOperation {
    pub operation_id: String,
    pub summary: String,
    pub description: String,
    pub embedding: Vec<f32>,
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Scores every entry against `query` and keeps the top `limit`.
///
/// A stored vector whose dimension differs from the query means the index was
/// built with another model, which is reported as a database error.
pub fn rank_by_similarity<'a, I>(query: &[f32], entries: I, limit: usize) -> Result<Vec<SearchResult>, SearchError>
where
    I: IntoIterator<Item = &'a IndexedOperation>,
{
    if query.is_empty() {
        return Err(SearchError::Database("query vector is empty".to_string()));
    }

    let mut scored = Vec::new();
    for entry in entries {
        if entry.embedding.len() != query.len() {
            return Err(SearchError::Database(format!(
                "embedding for {} has dimension {}, query has {}",
                entry.operation_id,
                entry.embedding.len(),
                query.len()
            )));
        }
        scored.push((cosine_similarity(query, &entry.embedding), entry));
    }

    // sort_by is stable, so ties stay in catalog order.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(limit)
        .map(|(score, entry)| SearchResult {
            operation_id: entry.operation_id.clone(),
            summary: entry.summary.clone(),
            description: entry.description.clone(),
            similarity_score: score,
        })
        .collect())
}

/// Index held entirely in memory, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorIndex {
    entries: Vec<IndexedOperation>,
}

impl InMemoryVectorIndex {
    pub fn new(entries: Vec<IndexedOperation>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        Ok(rank_by_similarity(query_vector, &self.entries, limit)?)
    }
}

#[cfg(test)]
pub(crate) fn indexed(id: &str, embedding: Vec<f32>) -> IndexedOperation {
    IndexedOperation {
        operation_id: id.to_string(),
        summary: format!("{} summary", id),
        description: format!("{} description", id),
        embedding,
    }
}
