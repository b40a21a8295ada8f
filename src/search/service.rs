// Semantic Search Service - query → ranked API operations
use crate::{
    cache::QueryCache,
    config::SearchConfig,
    embedding::{EmbeddingGenerator, EmbeddingGeneratorFactory},
    errors::SearchError,
    index::VectorIndex,
    logging::{EventLog, SearchEvent},
    schema::SearchResult,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

type GeneratorInit = Shared<BoxFuture<'static, Result<Arc<dyn EmbeddingGenerator>, SearchError>>>;

/// Lifecycle of the memoized embedding generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Entry point of the search pipeline: validation, caching, embedding and
/// retrieval. Scores are returned exactly as the index reports them.
pub struct SemanticSearchService {
    factory: Arc<dyn EmbeddingGeneratorFactory>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<QueryCache<Vec<SearchResult>>>,
    config: SearchConfig,
    events: Arc<dyn EventLog>,
    // Concurrent first callers await the same in-flight load; cleared on failure.
    generator: Mutex<Option<GeneratorInit>>,
}

impl SemanticSearchService {
    pub fn new(
        factory: Arc<dyn EmbeddingGeneratorFactory>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<QueryCache<Vec<SearchResult>>>,
        config: SearchConfig,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            factory,
            index,
            cache,
            config,
            events,
            generator: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &QueryCache<Vec<SearchResult>> {
        &self.cache
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches for operations matching `query`.
    ///
    /// `query` is `None` when the caller supplied something other than a string.
    /// `limit` falls back to the default when absent or not finite, is truncated,
    /// then clamped into the configured bounds.
    pub async fn search(&self, query: Option<&str>, limit: Option<f64>) -> Result<Vec<SearchResult>, SearchError> {
        let started = Instant::now();
        let result = self.run(query, limit, started).await;
        if let Err(e) = &result {
            self.events.record(SearchEvent::SearchError {
                kind: error_kind(e),
                message: e.to_string(),
            });
        }
        result
    }

    async fn run(&self, query: Option<&str>, limit: Option<f64>, started: Instant) -> Result<Vec<SearchResult>, SearchError> {
        let query = self.normalize_query(query)?;
        let limit = self.normalize_limit(limit);
        let bypass_cache = self.bypasses_cache(query);

        self.events.record(SearchEvent::SearchStart {
            query_length: query.chars().count(),
            limit,
            bypass_cache,
        });

        let cache_key = if bypass_cache { None } else { Some(cache_key(query, limit)) };

        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                self.record_success(cached.len(), true, started);
                return Ok(cached);
            }
        }

        let generator = self.generator().await?;
        let vector = generator.generate(query).await.map_err(into_model_error)?;
        let results = self.index.search(&vector, limit).await.map_err(into_database_error)?;

        if let Some(key) = &cache_key {
            self.cache.set(key, results.clone());
        }

        self.record_success(results.len(), false, started);
        Ok(results)
    }

    fn normalize_query<'q>(&self, query: Option<&'q str>) -> Result<&'q str, SearchError> {
        let query = query
            .ok_or_else(|| SearchError::Validation("query must be a string".to_string()))?
            .trim();

        if query.is_empty() {
            return Err(SearchError::Validation("query must not be empty".to_string()));
        }

        let length = query.chars().count();
        if length > self.config.max_query_length {
            return Err(SearchError::Validation(format!(
                "query is {} characters, maximum is {}",
                length, self.config.max_query_length
            )));
        }

        Ok(query)
    }

    fn normalize_limit(&self, limit: Option<f64>) -> usize {
        let requested = match limit {
            Some(value) if value.is_finite() => value.trunc(),
            _ => self.config.default_limit as f64,
        };
        // An inverted range collapses to `min_limit` instead of panicking.
        let min = self.config.min_limit as f64;
        let max = (self.config.max_limit as f64).max(min);
        requested.max(min).min(max) as usize
    }

    fn bypasses_cache(&self, query: &str) -> bool {
        let prefix = &self.config.cache_bypass_prefix;
        !prefix.is_empty() && query.starts_with(prefix.as_str())
    }

    fn record_success(&self, result_count: usize, from_cache: bool, started: Instant) {
        self.events.record(SearchEvent::SearchSuccess {
            result_count,
            from_cache,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    /// Returns the memoized generator, loading it on first use.
    async fn generator(&self) -> Result<Arc<dyn EmbeddingGenerator>, SearchError> {
        let init = {
            let mut slot = self.generator.lock();
            match slot.as_ref() {
                Some(init) => init.clone(),
                None => {
                    let factory = Arc::clone(&self.factory);
                    let init = async move { factory.create().await.map_err(into_model_error) }
                        .boxed()
                        .shared();
                    *slot = Some(init.clone());
                    init
                }
            }
        };

        match init.clone().await {
            Ok(generator) => Ok(generator),
            Err(e) => {
                let mut slot = self.generator.lock();
                if slot.as_ref().is_some_and(|current| current.ptr_eq(&init)) {
                    *slot = None;
                }
                Err(e)
            }
        }
    }

    pub fn generator_state(&self) -> GeneratorState {
        match self.generator.lock().as_ref() {
            None => GeneratorState::Uninitialized,
            Some(init) => match init.peek() {
                Some(Ok(_)) => GeneratorState::Ready,
                Some(Err(_)) | None => GeneratorState::Initializing,
            },
        }
    }

    /// Releases the loaded model, if any. A later search loads it again.
    pub async fn dispose(&self) {
        let ready = {
            let mut slot = self.generator.lock();
            let generator = match slot.as_ref().and_then(|init| init.peek()) {
                Some(Ok(generator)) => Some(Arc::clone(generator)),
                _ => None,
            };
            if generator.is_some() {
                *slot = None;
            }
            generator
        };
        if let Some(generator) = ready {
            generator.dispose().await;
        }
    }
}

/// Cache key: hex SHA-256 over the case- and whitespace-folded query plus the
/// effective limit, so different limits never share a ranked list.
pub fn cache_key(normalized_query: &str, limit: usize) -> String {
    let folded = normalized_query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(folded.as_bytes());
    hasher.update(b"\0");
    hasher.update(limit.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn into_model_error(error: anyhow::Error) -> SearchError {
    match error.downcast::<SearchError>() {
        Ok(e @ (SearchError::Validation(_) | SearchError::ModelLoad(_))) => e,
        Ok(other) => SearchError::ModelLoad(other.to_string()),
        Err(error) => SearchError::ModelLoad(format!("{:#}", error)),
    }
}

fn into_database_error(error: anyhow::Error) -> SearchError {
    match error.downcast::<SearchError>() {
        Ok(e @ SearchError::Database(_)) => e,
        Ok(other) => SearchError::Database(other.to_string()),
        Err(error) => SearchError::Database(format!("{:#}", error)),
    }
}

fn error_kind(error: &SearchError) -> &'static str {
    match error {
        SearchError::Validation(_) => "validation",
        SearchError::ModelLoad(_) => "model_load",
        SearchError::Database(_) => "database",
        SearchError::Timeout(_) => "timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheStore};
    use crate::config::CacheConfig;
    use crate::errors::CacheError;
    use crate::logging::testing::RecordingEventLog;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        creates: AtomicUsize,
        generates: AtomicUsize,
        searches: AtomicUsize,
    }

    struct StubGenerator {
        counters: Arc<Counters>,
        fail_with: Option<fn() -> anyhow::Error>,
    }

    #[async_trait]
    impl EmbeddingGenerator for StubGenerator {
        async fn generate(&self, _text: &str) -> Result<Vec<f32>> {
            self.counters.generates.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(make_error) => Err(make_error()),
                None => Ok(vec![1.0, 0.0]),
            }
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Fails the first `failures` constructions, optionally after a delay.
    struct StubFactory {
        counters: Arc<Counters>,
        failures: usize,
        delay: Duration,
        generate_error: Option<fn() -> anyhow::Error>,
    }

    #[async_trait]
    impl EmbeddingGeneratorFactory for StubFactory {
        async fn create(&self) -> Result<Arc<dyn EmbeddingGenerator>> {
            let attempt = self.counters.creates.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if attempt < self.failures {
                return Err(anyhow!("model artifact missing"));
            }
            Ok(Arc::new(StubGenerator {
                counters: Arc::clone(&self.counters),
                fail_with: self.generate_error,
            }))
        }
    }

    struct StubIndex {
        counters: Arc<Counters>,
        results: Vec<SearchResult>,
        limits: parking_lot::Mutex<Vec<usize>>,
        fail_with: Option<fn() -> anyhow::Error>,
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn search(&self, _query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
            self.counters.searches.fetch_add(1, Ordering::SeqCst);
            self.limits.lock().push(limit);
            if let Some(make_error) = self.fail_with {
                return Err(make_error());
            }
            Ok(self.results.iter().take(limit).cloned().collect())
        }
    }

    fn hit(id: &str, score: f32) -> SearchResult {
        SearchResult {
            operation_id: id.to_string(),
            summary: format!("{} summary", id),
            description: format!("{} description", id),
            similarity_score: score,
        }
    }

    struct Harness {
        service: SemanticSearchService,
        counters: Arc<Counters>,
        index: Arc<StubIndex>,
        events: Arc<RecordingEventLog>,
    }

    struct HarnessOptions {
        factory_failures: usize,
        factory_delay: Duration,
        generate_error: Option<fn() -> anyhow::Error>,
        index_error: Option<fn() -> anyhow::Error>,
    }

    impl Default for HarnessOptions {
        fn default() -> Self {
            Self {
                factory_failures: 0,
                factory_delay: Duration::ZERO,
                generate_error: None,
                index_error: None,
            }
        }
    }

    fn harness(options: HarnessOptions) -> Harness {
        let counters = Arc::new(Counters::default());
        let events = Arc::new(RecordingEventLog::default());
        let factory = Arc::new(StubFactory {
            counters: Arc::clone(&counters),
            failures: options.factory_failures,
            delay: options.factory_delay,
            generate_error: options.generate_error,
        });
        let index = Arc::new(StubIndex {
            counters: Arc::clone(&counters),
            results: vec![hit("A", 0.9), hit("B", 0.5)],
            limits: parking_lot::Mutex::new(Vec::new()),
            fail_with: options.index_error,
        });
        let cache = Arc::new(QueryCache::new(&CacheConfig::default(), events.clone()).unwrap());
        let service = SemanticSearchService::new(
            factory,
            index.clone(),
            cache,
            SearchConfig::default(),
            events.clone(),
        );
        Harness {
            service,
            counters,
            index,
            events,
        }
    }

    fn default_harness() -> Harness {
        harness(HarnessOptions::default())
    }

    #[tokio::test]
    async fn repeated_query_hits_cache() {
        let h = default_harness();
        let first = h.service.search(Some("list repositories"), None).await.unwrap();
        let second = h.service.search(Some("  list repositories  "), None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.counters.generates.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.searches.load(Ordering::SeqCst), 1);
        assert_eq!(h.service.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn bypass_prefix_skips_cache_every_time() {
        let h = default_harness();
        h.service.search(Some("_list repositories"), None).await.unwrap();
        h.service.search(Some("_list repositories"), None).await.unwrap();

        assert_eq!(h.counters.generates.load(Ordering::SeqCst), 2);
        assert!(h.service.cache().is_empty());
        let stats = h.service.cache().stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[tokio::test]
    async fn limit_is_defaulted_truncated_and_clamped() {
        let h = default_harness();
        h.service.search(Some("_a"), Some(0.0)).await.unwrap();
        h.service.search(Some("_a"), Some(1000.0)).await.unwrap();
        h.service.search(Some("_a"), None).await.unwrap();
        h.service.search(Some("_a"), Some(f64::NAN)).await.unwrap();
        h.service.search(Some("_a"), Some(f64::INFINITY)).await.unwrap();
        h.service.search(Some("_a"), Some(3.7)).await.unwrap();
        h.service.search(Some("_a"), Some(-4.0)).await.unwrap();

        assert_eq!(*h.index.limits.lock(), vec![1, 100, 5, 5, 5, 3, 1]);
    }

    #[tokio::test]
    async fn inverted_limit_bounds_do_not_panic() {
        let counters = Arc::new(Counters::default());
        let events = Arc::new(RecordingEventLog::default());
        let index = Arc::new(StubIndex {
            counters: Arc::clone(&counters),
            results: vec![hit("A", 0.9), hit("B", 0.5)],
            limits: parking_lot::Mutex::new(Vec::new()),
            fail_with: None,
        });
        let config = SearchConfig {
            min_limit: 10,
            max_limit: 2,
            ..SearchConfig::default()
        };
        let service = SemanticSearchService::new(
            Arc::new(StubFactory {
                counters: Arc::clone(&counters),
                failures: 0,
                delay: Duration::ZERO,
                generate_error: None,
            }),
            index.clone(),
            Arc::new(QueryCache::new(&CacheConfig::default(), events.clone()).unwrap()),
            config,
            events,
        );

        service.search(Some("_a"), Some(50.0)).await.unwrap();
        service.search(Some("_a"), Some(1.0)).await.unwrap();
        assert_eq!(*index.limits.lock(), vec![10, 10]);
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    impl CacheStore<Vec<SearchResult>> for BrokenStore {
        fn get(&mut self, _key: &str) -> Result<Option<CacheEntry<Vec<SearchResult>>>, CacheError> {
            Err(CacheError::Storage("connection reset".to_string()))
        }

        fn put(&mut self, _key: String, _entry: CacheEntry<Vec<SearchResult>>) -> Result<(), CacheError> {
            Err(CacheError::Storage("connection reset".to_string()))
        }

        fn remove(&mut self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Storage("connection reset".to_string()))
        }

        fn pop_lru(&mut self) -> Result<Option<String>, CacheError> {
            Err(CacheError::Storage("connection reset".to_string()))
        }

        fn clear(&mut self) -> Result<(), CacheError> {
            Err(CacheError::Storage("connection reset".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn broken_cache_storage_never_fails_a_search() {
        let counters = Arc::new(Counters::default());
        let events = Arc::new(RecordingEventLog::default());
        let index = Arc::new(StubIndex {
            counters: Arc::clone(&counters),
            results: vec![hit("A", 0.9), hit("B", 0.5)],
            limits: parking_lot::Mutex::new(Vec::new()),
            fail_with: None,
        });
        let cache =
            QueryCache::<Vec<SearchResult>>::with_store(10, Duration::from_secs(60), Box::new(BrokenStore), events.clone())
                .unwrap();
        let service = SemanticSearchService::new(
            Arc::new(StubFactory {
                counters: Arc::clone(&counters),
                failures: 0,
                delay: Duration::ZERO,
                generate_error: None,
            }),
            index,
            Arc::new(cache),
            SearchConfig::default(),
            events.clone(),
        );

        let first = service.search(Some("list projects"), None).await.unwrap();
        let second = service.search(Some("list projects"), None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(counters.generates.load(Ordering::SeqCst), 2);
        assert_eq!(counters.searches.load(Ordering::SeqCst), 2);
        assert!(!service.cache().is_available());

        let names = events.names();
        assert_eq!(names.iter().filter(|n| **n == "cache.disabled").count(), 1);
        assert!(!names.contains(&"search.error"));
    }

    #[tokio::test]
    async fn invalid_queries_are_validation_errors() {
        let h = default_harness();
        let too_long = "a".repeat(1001);
        for query in [Some(""), Some("   "), Some(too_long.as_str()), None] {
            let err = h.service.search(query, None).await.unwrap_err();
            assert!(matches!(err, SearchError::Validation(_)), "{:?}", err);
        }
        assert_eq!(h.counters.creates.load(Ordering::SeqCst), 0);

        let at_limit = "a".repeat(1000);
        assert!(h.service.search(Some(&at_limit), None).await.is_ok());
    }

    #[tokio::test]
    async fn results_pass_through_in_index_order_unclamped() {
        let counters = Arc::new(Counters::default());
        let events = Arc::new(RecordingEventLog::default());
        let index = Arc::new(StubIndex {
            counters: Arc::clone(&counters),
            results: vec![hit("A", 1.3), hit("B", -0.2)],
            limits: parking_lot::Mutex::new(Vec::new()),
            fail_with: None,
        });
        let service = SemanticSearchService::new(
            Arc::new(StubFactory {
                counters: Arc::clone(&counters),
                failures: 0,
                delay: Duration::ZERO,
                generate_error: None,
            }),
            index,
            Arc::new(QueryCache::new(&CacheConfig::default(), events.clone()).unwrap()),
            SearchConfig::default(),
            events,
        );

        let results = service.search(Some("create pull request"), Some(10.0)).await.unwrap();
        assert_eq!(results, vec![hit("A", 1.3), hit("B", -0.2)]);
    }

    #[tokio::test]
    async fn caller_mutation_does_not_leak_into_cache() {
        let h = default_harness();
        let mut first = h.service.search(Some("get branches"), None).await.unwrap();
        first[0].summary = "tampered".to_string();
        first.clear();

        let second = h.service.search(Some("get branches"), None).await.unwrap();
        assert_eq!(second, vec![hit("A", 0.9), hit("B", 0.5)]);
    }

    #[tokio::test]
    async fn generic_index_failure_becomes_database_error() {
        let h = harness(HarnessOptions {
            index_error: Some(|| anyhow!("db offline")),
            ..Default::default()
        });
        let err = h.service.search(Some("list projects"), None).await.unwrap_err();
        assert!(matches!(&err, SearchError::Database(msg) if msg.contains("db offline")));
        assert!(h.service.cache().is_empty());
        assert!(h.events.names().contains(&"search.error"));
    }

    #[tokio::test]
    async fn database_errors_pass_through_unchanged() {
        let h = harness(HarnessOptions {
            index_error: Some(|| SearchError::Database("index corrupted".into()).into()),
            ..Default::default()
        });
        let err = h.service.search(Some("list projects"), None).await.unwrap_err();
        assert_eq!(err, SearchError::Database("index corrupted".into()));
    }

    #[tokio::test]
    async fn generation_failure_becomes_model_error() {
        let h = harness(HarnessOptions {
            generate_error: Some(|| anyhow!("onnx runtime crashed")),
            ..Default::default()
        });
        let err = h.service.search(Some("list projects"), None).await.unwrap_err();
        assert!(matches!(err, SearchError::ModelLoad(_)));
        assert_eq!(h.counters.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_from_generator_passes_through() {
        let h = harness(HarnessOptions {
            generate_error: Some(|| SearchError::Validation("token limit".into()).into()),
            ..Default::default()
        });
        let err = h.service.search(Some("list projects"), None).await.unwrap_err();
        assert_eq!(err, SearchError::Validation("token limit".into()));
    }

    #[tokio::test]
    async fn failed_construction_is_retried_on_next_call() {
        let h = harness(HarnessOptions {
            factory_failures: 1,
            ..Default::default()
        });

        let err = h.service.search(Some("list projects"), None).await.unwrap_err();
        assert!(matches!(err, SearchError::ModelLoad(_)));
        assert_eq!(h.service.generator_state(), GeneratorState::Uninitialized);

        let results = h.service.search(Some("list projects"), None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(h.counters.creates.load(Ordering::SeqCst), 2);
        assert_eq!(h.service.generator_state(), GeneratorState::Ready);

        h.service.search(Some("_another query"), None).await.unwrap();
        assert_eq!(h.counters.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_initialization() {
        let h = harness(HarnessOptions {
            factory_delay: Duration::from_millis(50),
            ..Default::default()
        });

        let searches = (0..8).map(|i| {
            let service = &h.service;
            async move { service.search(Some(&format!("_query {}", i)), None).await }
        });
        let results = futures::future::join_all(searches).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(h.counters.creates.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.generates.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn dispose_resets_generator() {
        let h = default_harness();
        h.service.search(Some("_warm up"), None).await.unwrap();
        assert_eq!(h.service.generator_state(), GeneratorState::Ready);

        h.service.dispose().await;
        assert_eq!(h.service.generator_state(), GeneratorState::Uninitialized);

        h.service.search(Some("_again"), None).await.unwrap();
        assert_eq!(h.counters.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn logs_start_and_success_events() {
        let h = default_harness();
        h.service.search(Some("list projects"), None).await.unwrap();
        h.service.search(Some("list projects"), None).await.unwrap();

        let names = h.events.names();
        assert_eq!(
            names,
            vec![
                "search.start",
                "cache.miss",
                "search.success",
                "search.start",
                "cache.hit",
                "search.success",
            ]
        );
    }

    #[test]
    fn cache_key_folds_case_and_whitespace() {
        assert_eq!(cache_key("List   Repositories", 5), cache_key("list repositories", 5));
        assert_ne!(cache_key("list repositories", 5), cache_key("list repositories", 10));
        assert_ne!(cache_key("list repositories", 5), cache_key("list branches", 5));
        assert_eq!(cache_key("x", 5).len(), 64);
    }
}
