//! Query classification: does the query name a country or a city?

use super::providers::{country_alias, is_country_feature};
use super::types::{RawPlace, SearchMode};
use std::collections::BTreeSet;

/// How many leading results are inspected for a country-level record.
const COUNTRY_SCAN_DEPTH: usize = 10;

/// Decide the search mode for a normalized query and its primary results.
///
/// First match wins: a country-level record among the leading results whose
/// name or country overlaps the query, then an exact country name among all
/// results, then the static alias table.
pub fn classify(query: &str, results: &[RawPlace]) -> SearchMode {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return SearchMode::City;
    }

    for place in results.iter().take(COUNTRY_SCAN_DEPTH) {
        if !is_country_feature(&place.feature_code) {
            continue;
        }
        let name = place.name.to_lowercase();
        let country = place.country.to_lowercase();
        if overlaps(&q, &name) || overlaps(&q, &country) {
            let target = if place.country.is_empty() { &place.name } else { &place.country };
            tracing::debug!(query = %q, country = %target, "country record matched");
            return SearchMode::Country(target.clone());
        }
    }

    let countries: BTreeSet<&str> = results
        .iter()
        .map(|p| p.country.as_str())
        .filter(|c| !c.is_empty())
        .collect();
    if let Some(country) = countries.iter().find(|c| c.to_lowercase() == q) {
        tracing::debug!(query = %q, country = %country, "result country matched");
        return SearchMode::Country(country.to_string());
    }

    if let Some(country) = country_alias(&q) {
        tracing::debug!(query = %q, country, "alias matched");
        return SearchMode::Country(country.to_string());
    }

    SearchMode::City
}

fn overlaps(query: &str, candidate: &str) -> bool {
    !candidate.is_empty() && (candidate == query || candidate.contains(query) || query.contains(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str, country: &str, feature_code: &str) -> RawPlace {
        RawPlace {
            id: 0,
            name: name.into(),
            country: country.into(),
            country_code: None,
            admin1: None,
            admin2: None,
            latitude: 0.0,
            longitude: 0.0,
            feature_code: feature_code.into(),
            population: None,
        }
    }

    #[test]
    fn test_country_record_exact() {
        let results = vec![place("Japan", "Japan", "PCLI"), place("Japan", "United States", "PPL")];
        assert_eq!(classify("japan", &results), SearchMode::Country("Japan".into()));
    }

    #[test]
    fn test_country_record_contained() {
        // "Republic of Korea" contains "korea"; query "south korea" contains neither fully,
        // but the record's country does.
        let results = vec![place("Republic of Korea", "South Korea", "PCLI")];
        assert_eq!(classify("south korea", &results), SearchMode::Country("South Korea".into()));
    }

    #[test]
    fn test_country_record_beyond_scan_depth_ignored() {
        let mut results: Vec<RawPlace> = (0..10).map(|i| place(&format!("Town{}", i), "Nowhere", "PPL")).collect();
        results.push(place("Atlantis", "Atlantis", "PCLI"));
        assert_eq!(classify("atlantis", &results), SearchMode::Country("Atlantis".into()));

        // Same shape but the tail record's country never equals the query exactly.
        let mut results: Vec<RawPlace> = (0..10).map(|i| place(&format!("Town{}", i), "Nowhere", "PPL")).collect();
        results.push(place("Atlantis", "Atlantic Union", "PCLI"));
        assert_eq!(classify("atlantis", &results), SearchMode::City);
    }

    #[test]
    fn test_exact_country_among_results() {
        let results = vec![place("Paris", "France", "PPLC"), place("Lyon", "France", "PPLA")];
        assert_eq!(classify("france", &results), SearchMode::Country("France".into()));
    }

    #[test]
    fn test_alias_table() {
        let results = vec![place("Usa", "Japan", "PPL")];
        assert_eq!(classify("usa", &results), SearchMode::Country("United States".into()));
        assert_eq!(classify("uk", &[]), SearchMode::Country("United Kingdom".into()));
    }

    #[test]
    fn test_city_query() {
        let results = vec![place("Tokyo", "Japan", "PPLC"), place("Paris", "France", "PPLC")];
        assert_eq!(classify("tokyo", &results), SearchMode::City);
        assert_eq!(classify("paris", &[]), SearchMode::City);
    }
}
