//! Structured event logging for the search pipeline.
//!
//! The cache and the search service receive an [`EventLog`] at construction
//! instead of reaching for a global logger. [`TracingEventLog`] forwards every
//! event to `tracing`; tests swap in a recorder.

use std::fmt;
use std::sync::Arc;
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Expired,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::Absent => f.write_str("absent"),
            MissReason::Expired => f.write_str("expired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    CacheHit {
        key: String,
    },
    CacheMiss {
        key: String,
        reason: MissReason,
    },
    CacheStats {
        hits: u64,
        misses: u64,
        size: usize,
        hit_rate: f64,
    },
    CacheDisabled {
        operation: &'static str,
        error: String,
    },
    SearchStart {
        query_length: usize,
        limit: usize,
        bypass_cache: bool,
    },
    SearchSuccess {
        result_count: usize,
        from_cache: bool,
        duration_ms: u64,
    },
    SearchError {
        kind: &'static str,
        message: String,
    },
}

impl SearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEvent::CacheHit { .. } => "cache.hit",
            SearchEvent::CacheMiss { .. } => "cache.miss",
            SearchEvent::CacheStats { .. } => "cache.stats",
            SearchEvent::CacheDisabled { .. } => "cache.disabled",
            SearchEvent::SearchStart { .. } => "search.start",
            SearchEvent::SearchSuccess { .. } => "search.success",
            SearchEvent::SearchError { .. } => "search.error",
        }
    }
}

pub trait EventLog: Send + Sync {
    fn record(&self, event: SearchEvent);
}

/// Forwards pipeline events to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl TracingEventLog {
    pub fn shared() -> Arc<dyn EventLog> {
        Arc::new(TracingEventLog)
    }
}

impl EventLog for TracingEventLog {
    fn record(&self, event: SearchEvent) {
        let name = event.name();
        match event {
            SearchEvent::CacheHit { key } => {
                tracing::debug!(event = name, key = %short_key(&key), "Cache hit");
            }
            SearchEvent::CacheMiss { key, reason } => {
                tracing::debug!(event = name, key = %short_key(&key), reason = %reason, "Cache miss");
            }
            SearchEvent::CacheStats { hits, misses, size, hit_rate } => {
                tracing::info!(event = name, hits, misses, size, hit_rate, "Cache statistics");
            }
            SearchEvent::CacheDisabled { operation, error } => {
                tracing::error!(event = name, operation, %error, "Query cache disabled after storage failure");
            }
            SearchEvent::SearchStart { query_length, limit, bypass_cache } => {
                tracing::debug!(event = name, query_length, limit, bypass_cache, "Semantic search started");
            }
            SearchEvent::SearchSuccess { result_count, from_cache, duration_ms } => {
                tracing::info!(event = name, result_count, from_cache, duration_ms, "Semantic search completed");
            }
            SearchEvent::SearchError { kind, message } => {
                tracing::warn!(event = name, kind, %message, "Semantic search failed");
            }
        }
    }
}

fn short_key(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

/// Installs the global subscriber. Output goes to stderr because stdout carries
/// the JSON-RPC stream.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        subscriber_fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        subscriber_fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
