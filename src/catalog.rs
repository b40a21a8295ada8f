//! Static catalog of Bitbucket Data Center REST operations.
//!
//! Loaded once at startup from a JSON file, either a bare array of operations
//! or an object with an `operations` array. Catalog order is preserved and
//! used as the tie-break order of the vector index.

use crate::schema::Operation;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read operation catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse operation catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate operation id in catalog: {0}")]
    DuplicateId(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Operation>),
    Wrapped { operations: Vec<Operation> },
}

#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<Operation>,
    by_id: HashMap<String, usize>,
}

impl OperationCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            operations = catalog.len(),
            "Loaded operation catalog"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let operations = match serde_json::from_str::<CatalogFile>(raw)? {
            CatalogFile::List(ops) => ops,
            CatalogFile::Wrapped { operations } => operations,
        };
        Self::from_operations(operations)
    }

    pub fn from_operations(operations: Vec<Operation>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(operations.len());
        for (position, op) in operations.iter().enumerate() {
            if by_id.insert(op.operation_id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateId(op.operation_id.clone()));
            }
        }
        Ok(Self { operations, by_id })
    }

    pub fn get(&self, operation_id: &str) -> Option<&Operation> {
        self.by_id.get(operation_id).map(|&i| &self.operations[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
