// Server Configuration
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub host: String,
    /// Port of the `/health` endpoint; 0 disables it.
    pub health_port: u16,

    pub catalog_path: PathBuf,
    pub embeddings_db_path: PathBuf,

    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub bitbucket: BitbucketConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    FastEmbed,
    Http,
}

impl FromStr for EmbeddingProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" | "local" => Ok(EmbeddingProvider::FastEmbed),
            "http" | "remote" => Ok(EmbeddingProvider::Http),
            other => bail!("Unknown embedding provider '{}' (expected 'fastembed' or 'http')", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Base URL of the embeddings service when `provider` is `http`.
    pub service_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub max_query_length: usize,
    pub cache_bypass_prefix: String,
    /// Budget applied by the search tool, not by the search service.
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            min_limit: 1,
            max_limit: 100,
            max_query_length: 1000,
            cache_bypass_prefix: "_".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl McpConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let search_defaults = SearchConfig::default();
        let cache_defaults = CacheConfig::default();

        let config = Self {
            host: var("HOST", "127.0.0.1"),
            health_port: parse_var(&lookup, "MCP_HEALTH_PORT", 3004)?,

            catalog_path: PathBuf::from(var("OPERATIONS_CATALOG_PATH", "data/operations.json")),
            embeddings_db_path: PathBuf::from(var("EMBEDDINGS_DB_PATH", "data/embeddings.db")),

            embedding: EmbeddingConfig {
                provider: var("EMBEDDING_PROVIDER", "fastembed").parse()?,
                service_url: lookup("EMBEDDINGS_SERVICE_URL"),
                cache_dir: lookup("EMBEDDING_MODEL_CACHE_DIR").map(PathBuf::from),
            },

            search: SearchConfig {
                default_limit: parse_var(&lookup, "SEARCH_DEFAULT_LIMIT", search_defaults.default_limit)?,
                min_limit: search_defaults.min_limit,
                max_limit: parse_var(&lookup, "SEARCH_MAX_LIMIT", search_defaults.max_limit)?,
                max_query_length: parse_var(&lookup, "SEARCH_MAX_QUERY_LENGTH", search_defaults.max_query_length)?,
                cache_bypass_prefix: var("SEARCH_CACHE_BYPASS_PREFIX", &search_defaults.cache_bypass_prefix),
                timeout_ms: parse_var(&lookup, "SEARCH_TIMEOUT_MS", search_defaults.timeout_ms)?,
            },

            cache: CacheConfig {
                max_size: parse_var(&lookup, "SEARCH_CACHE_MAX_SIZE", cache_defaults.max_size)?,
                ttl_ms: parse_var(&lookup, "SEARCH_CACHE_TTL_MS", cache_defaults.ttl_ms)?,
            },

            bitbucket: BitbucketConfig {
                base_url: var("BITBUCKET_URL", "http://localhost:7990"),
                token: lookup("BITBUCKET_TOKEN"),
                username: lookup("BITBUCKET_USERNAME"),
                password: lookup("BITBUCKET_PASSWORD"),
                timeout_secs: parse_var(&lookup, "BITBUCKET_TIMEOUT_SECS", 30)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.max_limit < self.search.min_limit {
            bail!(
                "SEARCH_MAX_LIMIT ({}) must be at least {}",
                self.search.max_limit,
                self.search.min_limit
            );
        }
        if self.search.default_limit < self.search.min_limit || self.search.default_limit > self.search.max_limit {
            bail!(
                "SEARCH_DEFAULT_LIMIT ({}) must be within [{}, {}]",
                self.search.default_limit,
                self.search.min_limit,
                self.search.max_limit
            );
        }
        if self.search.max_query_length == 0 {
            bail!("SEARCH_MAX_QUERY_LENGTH must be greater than 0");
        }
        if self.embedding.provider == EmbeddingProvider::Http && self.embedding.service_url.is_none() {
            bail!("EMBEDDINGS_SERVICE_URL is required when EMBEDDING_PROVIDER=http");
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<McpConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        McpConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.search.max_limit, 100);
        assert_eq!(config.search.max_query_length, 1000);
        assert_eq!(config.search.cache_bypass_prefix, "_");
        assert_eq!(config.search.timeout_ms, 5000);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.ttl_ms, 300_000);
        assert_eq!(config.embedding.provider, EmbeddingProvider::FastEmbed);
        assert_eq!(config.bitbucket.base_url, "http://localhost:7990");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("SEARCH_CACHE_MAX_SIZE", "10"),
            ("SEARCH_CACHE_TTL_MS", "250"),
            ("SEARCH_CACHE_BYPASS_PREFIX", "!"),
            ("EMBEDDING_PROVIDER", "http"),
            ("EMBEDDINGS_SERVICE_URL", "http://embed:3001"),
        ])
        .unwrap();
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.ttl_ms, 250);
        assert_eq!(config.search.cache_bypass_prefix, "!");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Http);
    }

    #[test]
    fn invalid_numbers_fail() {
        let err = config_from(&[("SEARCH_CACHE_MAX_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("SEARCH_CACHE_MAX_SIZE"));
    }

    #[test]
    fn http_provider_requires_url() {
        assert!(config_from(&[("EMBEDDING_PROVIDER", "http")]).is_err());
    }

    #[test]
    fn default_limit_must_fit_bounds() {
        assert!(config_from(&[("SEARCH_DEFAULT_LIMIT", "500")]).is_err());
    }
}
