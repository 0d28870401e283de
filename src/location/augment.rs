//! Country augmentation: grow a sparse country-level result set into a
//! list of that country's cities through bounded supplementary lookups.
//!
//! Lookups run with bounded concurrency but merge strictly in term order,
//! so first-match-wins deduplication is reproducible. Failures of individual
//! lookups are logged and skipped.

use super::providers::{is_city_feature, major_cities};
use super::types::{LocationError, RawPlace};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct AugmentOptions {
    /// Stop issuing lookups once the pool holds this many places.
    pub target: usize,
    /// Cap on static-table lookups per country.
    pub max_static_lookups: usize,
    /// Supplementary lookups allowed in flight at once.
    pub concurrency: usize,
    /// Places with a known population below this are dropped.
    pub min_population: u64,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            target: 25,
            max_static_lookups: 10,
            concurrency: 3,
            min_population: 1000,
        }
    }
}

fn belongs_to(place: &RawPlace, country: &str) -> bool {
    place.country.eq_ignore_ascii_case(country)
}

/// A primary or generic-query hit worth keeping for a country search.
pub fn is_eligible(place: &RawPlace, country: &str, min_population: u64) -> bool {
    belongs_to(place, country)
        && is_city_feature(&place.feature_code)
        && place.population.map_or(true, |p| p >= min_population)
}

/// Generic supplementary terms for countries without a static table.
pub fn fallback_terms(country: &str) -> Vec<String> {
    vec![
        format!("{} capital", country),
        format!("{} major cities", country),
        format!("{} city", country),
    ]
}

/// Build the candidate pool for `country`.
///
/// `lookup` issues one supplementary search; the resolver routes it through
/// its cache and coalescer. When `deadline` passes, whatever was merged so
/// far is returned.
pub async fn augment<L, Fut>(
    country: &str,
    primary: &[RawPlace],
    opts: &AugmentOptions,
    deadline: Option<Instant>,
    lookup: L,
) -> Vec<RawPlace>
where
    L: Fn(String) -> Fut,
    Fut: Future<Output = Result<Arc<Vec<RawPlace>>, LocationError>>,
{
    let mut pool: Vec<RawPlace> = primary
        .iter()
        .filter(|p| is_eligible(p, country, opts.min_population))
        .cloned()
        .collect();
    let mut seen: HashSet<u64> = pool.iter().map(|p| p.id).collect();

    if pool.len() >= opts.target {
        return pool;
    }

    let (terms, per_name) = match major_cities(country) {
        Some(names) => (
            names
                .iter()
                .take(opts.max_static_lookups)
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
            true,
        ),
        None => (fallback_terms(country), false),
    };
    tracing::debug!(country, terms = terms.len(), static_table = per_name, primary = pool.len(), "augmenting");

    let merge = async {
        let mut outcomes = stream::iter(terms)
            .map(|term| {
                let pending = lookup(term.clone());
                async move { (term, pending.await) }
            })
            .buffered(opts.concurrency.max(1));

        while let Some((term, outcome)) = outcomes.next().await {
            let places = match outcome {
                Ok(places) => places,
                Err(e) => {
                    tracing::warn!(country, term = %term, error = %e, "supplementary lookup failed");
                    continue;
                }
            };

            if per_name {
                // Only the first in-country city per name counts, even when it is already pooled.
                let first = places
                    .iter()
                    .find(|p| belongs_to(p, country) && is_city_feature(&p.feature_code));
                if let Some(place) = first {
                    if seen.insert(place.id) {
                        pool.push(place.clone());
                    }
                }
            } else {
                for place in places.iter() {
                    if is_eligible(place, country, opts.min_population) && seen.insert(place.id) {
                        pool.push(place.clone());
                    }
                }
            }

            if pool.len() >= opts.target {
                break;
            }
        }
    };

    match deadline {
        Some(deadline) => {
            if tokio::time::timeout_at(deadline, merge).await.is_err() {
                tracing::warn!(country, "augmentation budget exhausted, returning partial pool");
            }
        }
        None => merge.await,
    }

    pool
}
