//! Bitbucket Data Center REST client.
//!
//! Executes catalog operations: fills path placeholders, attaches query
//! parameters and the JSON body, and returns the status with the decoded body.

use crate::{
    config::BitbucketConfig,
    errors::{McpError, McpResult},
    schema::{Operation, ParameterLocation},
};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Argument key carrying the request body in `call_id` parameters.
pub const BODY_KEY: &str = "body";

#[derive(Debug, Clone)]
enum Auth {
    Anonymous,
    Bearer(String),
    Basic { username: String, password: String },
}

pub struct BitbucketClient {
    base_url: String,
    client: reqwest::Client,
    auth: Auth,
}

/// Request resolved from an operation and caller-supplied parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl BitbucketClient {
    pub fn new(config: &BitbucketConfig) -> McpResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) => Auth::Bearer(token.clone()),
            (None, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => {
                tracing::warn!("No Bitbucket credentials configured; requests will be anonymous");
                Auth::Anonymous
            }
        };

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Splits `params` by the operation's declared parameter locations.
    pub fn prepare(&self, operation: &Operation, params: &Map<String, Value>) -> McpResult<PreparedRequest> {
        let method = Method::from_bytes(operation.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| McpError::Internal(format!("Unsupported HTTP method: {}", operation.method)))?;

        let declared: Vec<&str> = operation.parameters.iter().map(|p| p.name.as_str()).collect();
        if let Some(unknown) = params
            .keys()
            .find(|key| key.as_str() != BODY_KEY && !declared.contains(&key.as_str()))
        {
            return Err(McpError::InvalidArguments(format!(
                "Unknown parameter '{}' for {} (accepted: {})",
                unknown,
                operation.operation_id,
                declared.join(", ")
            )));
        }

        let mut path = operation.path.clone();
        for param in operation.parameters_in(ParameterLocation::Path) {
            let value = params
                .get(&param.name)
                .and_then(scalar_to_string)
                .ok_or_else(|| McpError::InvalidArguments(format!("Missing path parameter '{}'", param.name)))?;
            path = path.replace(&format!("{{{}}}", param.name), &urlencoding::encode(&value));
        }

        let mut query = Vec::new();
        for param in operation.parameters_in(ParameterLocation::Query) {
            match params.get(&param.name) {
                Some(Value::Array(items)) => {
                    query.extend(items.iter().filter_map(scalar_to_string).map(|v| (param.name.clone(), v)));
                }
                Some(value) => {
                    if let Some(v) = scalar_to_string(value) {
                        query.push((param.name.clone(), v));
                    }
                }
                None if param.required => {
                    return Err(McpError::InvalidArguments(format!(
                        "Missing required query parameter '{}'",
                        param.name
                    )));
                }
                None => {}
            }
        }

        let headers = operation
            .parameters_in(ParameterLocation::Header)
            .filter_map(|param| {
                params
                    .get(&param.name)
                    .and_then(scalar_to_string)
                    .map(|v| (param.name.clone(), v))
            })
            .collect();

        let body = params.get(BODY_KEY).cloned();
        if body.is_some() && operation.request_body.is_none() && matches!(method, Method::GET | Method::HEAD) {
            return Err(McpError::InvalidArguments(format!(
                "{} does not accept a request body",
                operation.operation_id
            )));
        }

        Ok(PreparedRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            query,
            headers,
            body,
        })
    }

    pub async fn execute(&self, operation: &Operation, params: &Map<String, Value>) -> McpResult<ApiResponse> {
        let prepared = self.prepare(operation, params)?;
        tracing::info!(
            operation = %operation.operation_id,
            method = %prepared.method,
            url = %prepared.url,
            "Calling Bitbucket API"
        );

        let mut request = self
            .client
            .request(prepared.method.clone(), &prepared.url)
            .header("Accept", "application/json")
            .query(&prepared.query);

        for (name, value) in &prepared.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request = match &self.auth {
            Auth::Anonymous => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        };

        if let Some(body) = &prepared.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        tracing::debug!(operation = %operation.operation_id, status, "Bitbucket API responded");
        Ok(ApiResponse { status, body })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
