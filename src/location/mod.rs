//! Location search subsystem.
//!
//! Turns free-text queries into ranked city candidates: bounded caching,
//! request coalescing, country/city classification, country augmentation
//! and ranking on top of an upstream geocoder.

pub mod augment;
pub mod cache;
pub mod classify;
pub mod coalesce;
pub mod providers;
pub mod rank;
pub mod resolver;
pub mod types;

pub use cache::BoundedCache;
pub use coalesce::RequestCoalescer;
pub use providers::{Geocoder, OpenMeteoClient};
pub use resolver::{normalize_query, validate_query, LocationResolver, ResolverSettings};
pub use types::{compose_display_name, CityOption, LocationError, RawPlace, SearchMode};
