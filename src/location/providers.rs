//! Location providers: the upstream geocoding client and static lookup tables.

use super::types::{LocationError, RawPlace};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_USER_AGENT: &str = "placeseek/0.3 (location-autocomplete)";

const SOCKET_GRACE: Duration = Duration::from_secs(1);

// ─── Provider seam ──────────────────────────────────────────────

/// A forward geocoder returning raw place records for a free-text term.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(
        &self,
        query: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<RawPlace>, LocationError>;
}

// ─── Open-Meteo provider ────────────────────────────────────────

/// Client for the Open-Meteo geocoding API (GeoNames-backed).
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    endpoint: String,
    user_agent: String,
}

impl OpenMeteoClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl Geocoder for OpenMeteoClient {
    async fn search(
        &self,
        query: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<RawPlace>, LocationError> {
        let endpoint = self.endpoint.clone();
        let user_agent = self.user_agent.clone();
        let term = query.to_string();

        let call = tokio::task::spawn_blocking(move || {
            fetch_blocking(&endpoint, &user_agent, &term, count, timeout)
        });

        match tokio::time::timeout(timeout, call).await {
            Err(_) => Err(LocationError::UpstreamTimeout),
            Ok(Err(join)) => Err(LocationError::UpstreamUnavailable(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn fetch_blocking(
    endpoint: &str,
    user_agent: &str,
    query: &str,
    count: usize,
    timeout: Duration,
) -> Result<Vec<RawPlace>, LocationError> {
    // The async wrapper enforces `timeout`; the socket limit only has to
    // release the blocking thread afterwards.
    let response = ureq::get(endpoint)
        .set("User-Agent", user_agent)
        .timeout(timeout + SOCKET_GRACE)
        .query("name", query)
        .query("count", &count.to_string())
        .query("language", "en")
        .query("format", "json")
        .call()
        .map_err(map_ureq_error)?;

    let body: serde_json::Value = response.into_json().map_err(|e| {
        if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) {
            LocationError::UpstreamTimeout
        } else {
            LocationError::UpstreamBadResponse(e.to_string())
        }
    })?;

    parse_results(&body)
}

fn map_ureq_error(err: ureq::Error) -> LocationError {
    match err {
        ureq::Error::Status(429, _) => LocationError::UpstreamRateLimited,
        ureq::Error::Status(code, _) => LocationError::UpstreamUnavailable(format!("HTTP {}", code)),
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|s| s.downcast_ref::<std::io::Error>())
                .map(|io| matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock))
                .unwrap_or(false);
            if timed_out {
                LocationError::UpstreamTimeout
            } else {
                LocationError::UpstreamUnavailable(transport.to_string())
            }
        }
    }
}

// ─── Wire validation ────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct WirePlace {
    id: u64,
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    feature_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    admin2: Option<String>,
    #[serde(default)]
    population: Option<u64>,
}

impl WirePlace {
    fn validate(self) -> Result<RawPlace, LocationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LocationError::UpstreamBadResponse(format!("result {} has an empty name", self.id)));
        }
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if !lat_ok || !lon_ok {
            return Err(LocationError::UpstreamBadResponse(format!(
                "result {} has out-of-range coordinates ({}, {})",
                self.id, self.latitude, self.longitude
            )));
        }

        Ok(RawPlace {
            id: self.id,
            name,
            country: self.country.map(|c| c.trim().to_string()).unwrap_or_default(),
            country_code: non_empty(self.country_code),
            admin1: non_empty(self.admin1),
            admin2: non_empty(self.admin2),
            latitude: self.latitude,
            longitude: self.longitude,
            feature_code: self.feature_code.unwrap_or_default().trim().to_uppercase(),
            population: self.population,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Turn a decoded response body into validated places.
///
/// A missing or non-array `results` field means no matches. Any record
/// that fails to decode or validate rejects the whole response.
pub fn parse_results(body: &serde_json::Value) -> Result<Vec<RawPlace>, LocationError> {
    let object = body
        .as_object()
        .ok_or_else(|| LocationError::UpstreamBadResponse("response is not a JSON object".into()))?;

    let items = match object.get("results") {
        Some(serde_json::Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    items
        .iter()
        .map(|item| {
            WirePlace::deserialize(item)
                .map_err(|e| LocationError::UpstreamBadResponse(e.to_string()))?
                .validate()
        })
        .collect()
}

// ─── Feature codes ──────────────────────────────────────────────

/// Country-level GeoNames codes (independent, dependent, freely associated...).
pub fn is_country_feature(code: &str) -> bool {
    code.starts_with("PCL") || code == "TERR"
}

const CITY_FEATURES: &[&str] = &["PPL", "PPLA", "PPLA2", "PPLA3", "PPLA4", "PPLC", "PPLG", "PPLS"];

/// Populated places that read as a city or town.
pub fn is_city_feature(code: &str) -> bool {
    CITY_FEATURES.contains(&code)
}

/// Administrative tier: capital above first-order seats above lower orders.
pub fn feature_tier(code: &str) -> u8 {
    match code {
        "PPLC" => 6,
        "PPLA" => 5,
        "PPLA2" => 4,
        "PPLA3" => 3,
        "PPLA4" => 2,
        c if c.starts_with("PPL") => 1,
        _ => 0,
    }
}

// ─── Static tables ──────────────────────────────────────────────

/// Common shorthand for countries, mapped to the provider's country name.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("usa", "United States"), ("us", "United States"),
    ("u.s.", "United States"), ("u.s.a.", "United States"),
    ("america", "United States"), ("united states of america", "United States"),
    ("uk", "United Kingdom"), ("u.k.", "United Kingdom"),
    ("britain", "United Kingdom"), ("great britain", "United Kingdom"),
    ("england", "United Kingdom"),
    ("uae", "United Arab Emirates"), ("emirates", "United Arab Emirates"),
    ("holland", "Netherlands"), ("the netherlands", "Netherlands"),
    ("south korea", "South Korea"), ("korea", "South Korea"),
    ("czechia", "Czechia"), ("czech republic", "Czechia"),
    ("turkiye", "Turkey"), ("türkiye", "Turkey"),
    ("russian federation", "Russia"),
    ("deutschland", "Germany"), ("espana", "Spain"), ("españa", "Spain"),
    ("italia", "Italy"), ("brasil", "Brazil"), ("nippon", "Japan"),
    ("ksa", "Saudi Arabia"),
];

/// Major cities per country, capital first.
const MAJOR_CITIES: &[(&str, &[&str])] = &[
    ("Japan", &["Tokyo", "Osaka", "Yokohama", "Nagoya", "Sapporo", "Fukuoka", "Kobe", "Kyoto", "Hiroshima", "Sendai"]),
    ("United States", &["Washington", "New York", "Los Angeles", "Chicago", "Houston", "Phoenix", "Philadelphia", "San Antonio", "San Diego", "San Francisco"]),
    ("United Kingdom", &["London", "Birmingham", "Manchester", "Glasgow", "Liverpool", "Edinburgh", "Leeds", "Bristol", "Cardiff", "Belfast"]),
    ("France", &["Paris", "Marseille", "Lyon", "Toulouse", "Nice", "Nantes", "Strasbourg", "Montpellier", "Bordeaux", "Lille"]),
    ("Germany", &["Berlin", "Hamburg", "Munich", "Cologne", "Frankfurt am Main", "Stuttgart", "Düsseldorf", "Leipzig", "Dortmund", "Dresden"]),
    ("Italy", &["Rome", "Milan", "Naples", "Turin", "Palermo", "Genoa", "Bologna", "Florence", "Venice", "Verona"]),
    ("Spain", &["Madrid", "Barcelona", "Valencia", "Seville", "Zaragoza", "Málaga", "Bilbao", "Granada", "Palma", "Alicante"]),
    ("Canada", &["Ottawa", "Toronto", "Montreal", "Vancouver", "Calgary", "Edmonton", "Quebec", "Winnipeg", "Halifax", "Victoria"]),
    ("Australia", &["Canberra", "Sydney", "Melbourne", "Brisbane", "Perth", "Adelaide", "Gold Coast", "Hobart", "Darwin", "Cairns"]),
    ("China", &["Beijing", "Shanghai", "Guangzhou", "Shenzhen", "Chengdu", "Chongqing", "Wuhan", "Xi'an", "Hangzhou", "Nanjing"]),
    ("India", &["New Delhi", "Mumbai", "Bengaluru", "Kolkata", "Chennai", "Hyderabad", "Ahmedabad", "Pune", "Jaipur", "Goa"]),
    ("Brazil", &["Brasília", "São Paulo", "Rio de Janeiro", "Salvador", "Fortaleza", "Belo Horizonte", "Manaus", "Curitiba", "Recife", "Porto Alegre"]),
    ("Mexico", &["Mexico City", "Guadalajara", "Monterrey", "Puebla", "Cancún", "Tijuana", "Mérida", "Oaxaca", "Querétaro", "Puerto Vallarta"]),
    ("Thailand", &["Bangkok", "Chiang Mai", "Phuket", "Pattaya", "Krabi", "Hua Hin", "Ayutthaya", "Chiang Rai", "Khon Kaen", "Udon Thani"]),
    ("South Korea", &["Seoul", "Busan", "Incheon", "Daegu", "Daejeon", "Gwangju", "Ulsan", "Suwon", "Jeonju", "Gyeongju"]),
    ("Netherlands", &["Amsterdam", "Rotterdam", "The Hague", "Utrecht", "Eindhoven", "Groningen", "Maastricht", "Haarlem", "Leiden", "Delft"]),
    ("Portugal", &["Lisbon", "Porto", "Braga", "Coimbra", "Faro", "Funchal", "Aveiro", "Évora", "Sintra", "Lagos"]),
    ("Greece", &["Athens", "Thessaloniki", "Patras", "Heraklion", "Rhodes", "Chania", "Corfu", "Nafplio", "Volos", "Ioannina"]),
    ("Turkey", &["Ankara", "Istanbul", "Izmir", "Antalya", "Bursa", "Adana", "Konya", "Bodrum", "Trabzon", "Gaziantep"]),
    ("Egypt", &["Cairo", "Alexandria", "Giza", "Luxor", "Aswan", "Hurghada", "Sharm el-Sheikh", "Port Said", "Suez", "Mansoura"]),
    ("Sweden", &["Stockholm", "Gothenburg", "Malmö", "Uppsala", "Västerås", "Örebro", "Linköping", "Helsingborg", "Umeå", "Kiruna"]),
    ("Norway", &["Oslo", "Bergen", "Trondheim", "Stavanger", "Tromsø", "Kristiansand", "Drammen", "Ålesund", "Bodø", "Lillehammer"]),
];

/// Resolve a shorthand alias (case-insensitive, exact) to a country name.
pub fn country_alias(query: &str) -> Option<&'static str> {
    let q = query.trim().to_lowercase();
    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == q)
        .map(|(_, country)| *country)
}

/// Static major-city list for a country, capital first.
pub fn major_cities(country: &str) -> Option<&'static [&'static str]> {
    MAJOR_CITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(country.trim()))
        .map(|(_, cities)| *cities)
}

/// The capital listed for a country in the static table.
pub fn listed_capital(country: &str) -> Option<&'static str> {
    major_cities(country).and_then(|cities| cities.first().copied())
}
