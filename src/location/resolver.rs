//! Location resolver: orchestrates the search pipeline.
//!
//! Flow: result cache → primary lookup (cached, coalesced) → classify →
//! augment country searches → rank → cache result.

use super::augment::{augment, AugmentOptions};
use super::cache::BoundedCache;
use super::classify::classify;
use super::coalesce::RequestCoalescer;
use super::providers::Geocoder;
use super::rank::{rank, RankLimits};
use super::types::{CityOption, LocationError, RawPlace, SearchMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_QUERY_CHARS: usize = 200;

type Lookup = Arc<Vec<RawPlace>>;

/// Tunables for one resolver instance.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub primary_count: usize,
    pub supplementary_count: usize,
    pub primary_timeout: Duration,
    pub supplementary_timeout: Duration,
    /// Outer budget for a whole resolution.
    pub budget: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub augment: AugmentOptions,
    pub limits: RankLimits,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            primary_count: 50,
            supplementary_count: 5,
            primary_timeout: Duration::from_secs(10),
            supplementary_timeout: Duration::from_secs(8),
            budget: Duration::from_secs(10),
            cache_capacity: 500,
            cache_ttl: Duration::from_secs(3600),
            augment: AugmentOptions::default(),
            limits: RankLimits::default(),
        }
    }
}

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check a raw `q` parameter and return its trimmed form.
pub fn validate_query(raw: Option<&str>) -> Result<&str, LocationError> {
    let raw = raw.ok_or_else(|| LocationError::InvalidQuery("missing query".into()))?;
    if raw.chars().count() > MAX_QUERY_CHARS {
        return Err(LocationError::InvalidQuery(format!(
            "query longer than {} characters",
            MAX_QUERY_CHARS
        )));
    }
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Err(LocationError::InvalidQuery(format!(
            "query must be at least {} characters",
            MIN_QUERY_CHARS
        )));
    }
    Ok(trimmed)
}

/// The search engine facade. Built once and shared by reference.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    results: BoundedCache<String, Arc<Vec<CityOption>>>,
    lookups: Arc<BoundedCache<String, Lookup>>,
    coalescer: RequestCoalescer<Lookup>,
    settings: ResolverSettings,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, settings: ResolverSettings) -> Self {
        Self {
            geocoder,
            results: BoundedCache::new(settings.cache_capacity, settings.cache_ttl),
            lookups: Arc::new(BoundedCache::new(settings.cache_capacity, settings.cache_ttl)),
            coalescer: RequestCoalescer::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve a free-text query into ranked options.
    ///
    /// Callers are expected to validate first; a query shorter than two
    /// trimmed characters is rejected here as well.
    pub async fn resolve(&self, query: &str) -> Result<Vec<CityOption>, LocationError> {
        let trimmed = validate_query(Some(query))?;
        let key = normalize_query(trimmed);

        if let Some(hit) = self.results.get(&key) {
            tracing::debug!(query = %key, "result cache hit");
            return Ok(hit.as_ref().clone());
        }

        let deadline = Instant::now() + self.settings.budget;

        let primary = tokio::time::timeout_at(
            deadline,
            self.lookup(
                trimmed.to_string(),
                self.settings.primary_count,
                self.settings.primary_timeout,
            ),
        )
        .await
        .map_err(|_| LocationError::ResolveTimeout)??;

        let mode = classify(&key, &primary);
        tracing::debug!(query = %key, mode = %mode, primary = primary.len(), "classified");

        let pool = match &mode {
            SearchMode::Country(country) => {
                augment(country, &primary, &self.settings.augment, Some(deadline), |term| {
                    self.lookup(
                        term,
                        self.settings.supplementary_count,
                        self.settings.supplementary_timeout,
                    )
                })
                .await
            }
            SearchMode::City => primary.as_ref().clone(),
        };

        let ranked = rank(&key, &mode, &pool, &self.settings.limits);

        if Instant::now() < deadline {
            self.results.set(key, Arc::new(ranked.clone()));
        } else {
            tracing::debug!(query = %key, "partial result not cached");
        }
        Ok(ranked)
    }

    /// One upstream search, served from the lookup cache or shared with an
    /// identical in-flight call.
    async fn lookup(&self, term: String, count: usize, timeout: Duration) -> Result<Lookup, LocationError> {
        let key = format!("{}|{}", count, normalize_query(&term));
        if let Some(hit) = self.lookups.get(&key) {
            tracing::debug!(key = %key, "lookup cache hit");
            return Ok(hit);
        }

        let geocoder = Arc::clone(&self.geocoder);
        let cache = Arc::clone(&self.lookups);
        let cache_key = key.clone();
        self.coalescer
            .coalesce(&key, move || async move {
                match geocoder.search(&term, count, timeout).await {
                    Ok(places) => {
                        let places = Arc::new(places);
                        // Cached before the pending entry is released, so no
                        // caller can miss both.
                        cache.set(cache_key, Arc::clone(&places));
                        Ok(places)
                    }
                    Err(e) => {
                        tracing::warn!(term = %term, error = %e, "upstream search failed");
                        Err(e)
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn place(id: u64, name: &str, country: &str, fc: &str, pop: Option<u64>) -> RawPlace {
        RawPlace {
            id,
            name: name.into(),
            country: country.into(),
            country_code: None,
            admin1: None,
            admin2: None,
            latitude: 10.0,
            longitude: 20.0,
            feature_code: fc.into(),
            population: pop,
        }
    }

    #[derive(Default)]
    struct StubGeocoder {
        answers: HashMap<String, Result<Vec<RawPlace>, LocationError>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        terms: Mutex<Vec<String>>,
    }

    impl StubGeocoder {
        fn with(mut self, term: &str, answer: Result<Vec<RawPlace>, LocationError>) -> Self {
            self.answers.insert(term.to_lowercase(), answer);
            self
        }

        fn calls_for(&self, term: &str) -> usize {
            self.terms.lock().unwrap().iter().filter(|t| t.eq_ignore_ascii_case(term)).count()
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn search(&self, query: &str, _count: usize, _timeout: Duration) -> Result<Vec<RawPlace>, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.terms.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answers.get(&query.to_lowercase()).cloned().unwrap_or(Ok(Vec::new()))
        }
    }

    fn resolver(stub: Arc<StubGeocoder>) -> LocationResolver {
        LocationResolver::new(stub, ResolverSettings::default())
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query(None).is_err());
        assert!(validate_query(Some(" a ")).is_err());
        assert_eq!(validate_query(Some("  ab ")).unwrap(), "ab");
        assert!(validate_query(Some(&"x".repeat(201))).is_err());
        assert!(validate_query(Some(&"x".repeat(200))).is_ok());
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  New   York "), "new york");
        assert_eq!(normalize_query("TOKYO"), "tokyo");
    }

    #[tokio::test]
    async fn test_short_query_rejected_without_upstream_call() {
        let stub = Arc::new(StubGeocoder::default());
        let r = resolver(Arc::clone(&stub));
        assert!(matches!(r.resolve(" x ").await, Err(LocationError::InvalidQuery(_))));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_city_scenario_tokyo() {
        let stub = Arc::new(StubGeocoder::default().with("Tokyo", Ok(vec![place(1, "Tokyo", "Japan", "PPLC", None)])));
        let r = resolver(Arc::clone(&stub));

        let cities = r.resolve("Tokyo").await.unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].name, "Tokyo");
        assert_eq!(cities[0].country, "Japan");
        assert_eq!(cities[0].display_name, "Tokyo, Japan");
    }

    #[tokio::test]
    async fn test_no_matches_is_empty_list() {
        let stub = Arc::new(StubGeocoder::default());
        let r = resolver(stub);
        assert!(r.resolve("xyzabc123notreal").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_within_ttl() {
        let stub = Arc::new(StubGeocoder::default().with(
            "paris",
            Ok(vec![
                place(1, "Paris", "France", "PPLC", Some(2_100_000)),
                place(2, "Paris", "United States", "PPLA2", Some(25_000)),
            ]),
        ));
        let r = resolver(Arc::clone(&stub));

        let first = r.resolve("Paris").await.unwrap();
        let second = r.resolve("  PARIS ").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_coalesce() {
        let stub = Arc::new(StubGeocoder {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        }
        .with("paris", Ok(vec![place(1, "Paris", "France", "PPLC", None)])));
        let r = Arc::new(resolver(Arc::clone(&stub)));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.resolve("paris").await })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap().len(), 1);
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_country_scenario_japan() {
        let stub = Arc::new(
            StubGeocoder::default()
                .with("Japan", Ok(vec![
                    place(100, "Japan", "Japan", "PCLI", Some(126_000_000)),
                    place(101, "Japan", "United States", "PPL", Some(3000)),
                    place(2, "Osaka", "Japan", "PPLA", Some(2_600_000)),
                ]))
                .with("Tokyo", Ok(vec![place(1, "Tokyo", "Japan", "PPLC", Some(8_300_000))]))
                .with("Yokohama", Ok(vec![place(3, "Yokohama", "Japan", "PPLA", Some(3_700_000))]))
                .with("Nagoya", Err(LocationError::UpstreamTimeout))
                .with("Sapporo", Ok(vec![place(4, "Sapporo", "Japan", "PPLA", Some(1_900_000))])),
        );
        let r = resolver(Arc::clone(&stub));

        let cities = r.resolve("Japan").await.unwrap();
        assert!(!cities.is_empty() && cities.len() <= 25);
        assert!(cities.iter().all(|c| c.country == "Japan"));
        assert_eq!(cities[0].name, "Tokyo");
        assert!(cities.iter().any(|c| c.name == "Sapporo"));
        assert!(!cities.iter().any(|c| c.name == "Japan"));
        // One primary call plus one per static-table name, never repeated.
        assert_eq!(stub.calls_for("Osaka"), 1);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_alias_country_search() {
        let stub = Arc::new(
            StubGeocoder::default()
                .with("Washington", Ok(vec![place(1, "Washington", "United States", "PPLC", Some(690_000))]))
                .with("Chicago", Ok(vec![place(2, "Chicago", "United States", "PPLA2", Some(2_700_000))])),
        );
        let r = resolver(stub);
        let cities = r.resolve("usa").await.unwrap();
        assert_eq!(cities[0].name, "Washington");
        assert!(cities.iter().all(|c| c.country == "United States"));
    }

    #[tokio::test]
    async fn test_supplementary_lookups_are_cached() {
        let stub = Arc::new(
            StubGeocoder::default()
                .with("Japan", Ok(vec![place(100, "Japan", "Japan", "PCLI", None)]))
                .with("Tokyo", Ok(vec![place(1, "Tokyo", "Japan", "PPLC", None)])),
        );
        let r = resolver(Arc::clone(&stub));

        r.resolve("Japan").await.unwrap();
        // "nippon" is a distinct query routed to the same country.
        r.resolve("nippon").await.unwrap();
        assert_eq!(stub.calls_for("Tokyo"), 1);
        assert_eq!(stub.calls_for("nippon"), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_propagates() {
        let stub = Arc::new(StubGeocoder::default().with("berlin", Err(LocationError::UpstreamRateLimited)));
        let r = resolver(Arc::clone(&stub));
        assert_eq!(r.resolve("Berlin").await, Err(LocationError::UpstreamRateLimited));

        // Failures are not cached.
        let _ = r.resolve("Berlin").await;
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_over_budget_is_resolve_timeout() {
        let stub = Arc::new(StubGeocoder {
            delay: Some(Duration::from_secs(3600)),
            ..Default::default()
        });
        let r = resolver(stub);
        assert_eq!(r.resolve("Lisbon").await, Err(LocationError::ResolveTimeout));
    }
}
