//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One upstream geocoding hit, validated at the wire boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlace {
    pub id: u64,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub admin2: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// GeoNames feature code (e.g. "PPLC", "PPLA", "PCLI").
    pub feature_code: String,
    #[serde(default)]
    pub population: Option<u64>,
}

/// A ranked, client-facing search candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityOption {
    pub id: u64,
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin2: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

impl CityOption {
    pub fn from_raw(place: &RawPlace) -> Self {
        Self {
            id: place.id,
            name: place.name.clone(),
            country: place.country.clone(),
            admin1: place.admin1.clone(),
            admin2: place.admin2.clone(),
            latitude: place.latitude,
            longitude: place.longitude,
            display_name: compose_display_name(
                &place.name,
                place.admin1.as_deref(),
                &place.country,
            ),
        }
    }
}

/// Build `name[, admin1][, country]`.
///
/// `admin1` is skipped when absent, empty, or equal to the country (city
/// states such as Singapore report themselves as their own region).
pub fn compose_display_name(name: &str, admin1: Option<&str>, country: &str) -> String {
    let mut parts = vec![name.trim()];
    if let Some(region) = admin1.map(str::trim) {
        if !region.is_empty() && !region.eq_ignore_ascii_case(country.trim()) {
            parts.push(region);
        }
    }
    if !country.trim().is_empty() {
        parts.push(country.trim());
    }
    parts.join(", ")
}

/// Which resolution path a query takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// The query names a country; results are that country's major cities.
    Country(String),
    City,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country(c) => write!(f, "country({})", c),
            Self::City => write!(f, "city"),
        }
    }
}

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Geocoding provider timed out")]
    UpstreamTimeout,

    #[error("Geocoding provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Geocoding provider rate limited the request")]
    UpstreamRateLimited,

    #[error("Invalid geocoding response: {0}")]
    UpstreamBadResponse(String),

    #[error("Resolution exceeded its time budget")]
    ResolveTimeout,
}

impl LocationError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::UpstreamTimeout | Self::ResolveTimeout => "TIMEOUT",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::UpstreamRateLimited => "RATE_LIMITED",
            Self::UpstreamBadResponse(_) => "BAD_RESPONSE",
        }
    }
}
