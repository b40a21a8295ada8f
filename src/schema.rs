// Operation Schema - API operation descriptors and ranked search hits
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One Bitbucket Data Center REST operation from the static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,    // "getRepositories"
    pub method: String,          // "GET" | "POST" | ...
    pub path: String,            // "/rest/api/latest/projects/{projectKey}/repos"
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,       // ["Repository"]
    #[serde(default)]
    pub parameters: Vec<OperationParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>, // JSON schema of the body, if any
    #[serde(default)]
    pub deprecated: bool,
}

impl Operation {
    /// Text embedded for this operation at ingestion time.
    pub fn embedding_text(&self) -> String {
        if self.description.trim().is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n{}", self.summary, self.description)
        }
    }

    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &OperationParameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

/// Ranked hit returned by the vector index. `similarity_score` is the raw score
/// reported by the index and may fall outside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub operation_id: String,
    pub summary: String,
    pub description: String,
    pub similarity_score: f32,
}
