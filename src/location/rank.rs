//! Candidate ranking: dedup, score, sort, truncate.

use super::providers::{feature_tier, listed_capital};
use super::types::{CityOption, RawPlace, SearchMode};
use std::cmp::Reverse;
use std::collections::HashSet;

pub const COUNTRY_LIMIT: usize = 25;
pub const CITY_LIMIT: usize = 15;

/// Result-list sizes per search mode.
#[derive(Debug, Clone)]
pub struct RankLimits {
    pub country: usize,
    pub city: usize,
}

impl Default for RankLimits {
    fn default() -> Self {
        Self {
            country: COUNTRY_LIMIT,
            city: CITY_LIMIT,
        }
    }
}

/// Composite relevance. Field order is comparison order; greater is better.
///
/// `headline` is "is the capital" in country mode and "exact name match"
/// in city mode. Names compare reversed so ties fall back to A-Z.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    headline: bool,
    tier: u8,
    population: u64,
    name: Reverse<String>,
}

fn score(query: &str, mode: &SearchMode, capital: Option<&str>, place: &RawPlace) -> Score {
    let headline = match mode {
        SearchMode::Country(_) => {
            place.feature_code == "PPLC"
                || capital.is_some_and(|c| c.eq_ignore_ascii_case(&place.name))
        }
        SearchMode::City => place.name.to_lowercase() == query,
    };
    Score {
        headline,
        tier: feature_tier(&place.feature_code),
        population: place.population.unwrap_or(0),
        name: Reverse(place.name.to_lowercase()),
    }
}

/// Rank a candidate pool into the final option list.
///
/// Duplicate display names keep their first occurrence; equal scores keep
/// pool order.
pub fn rank(query: &str, mode: &SearchMode, pool: &[RawPlace], limits: &RankLimits) -> Vec<CityOption> {
    let q = query.trim().to_lowercase();
    let capital = match mode {
        SearchMode::Country(country) => listed_capital(country),
        SearchMode::City => None,
    };

    let mut seen = HashSet::new();
    let mut scored: Vec<(Score, CityOption)> = pool
        .iter()
        .filter_map(|place| {
            let option = CityOption::from_raw(place);
            if !seen.insert(option.display_name.clone()) {
                return None;
            }
            Some((score(&q, mode, capital, place), option))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let limit = match mode {
        SearchMode::Country(_) => limits.country,
        SearchMode::City => limits.city,
    };

    scored.into_iter().take(limit).map(|(_, option)| option).collect()
}
