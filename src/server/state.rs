use crate::location::LocationResolver;

use super::rate_limit::RateLimiter;

pub struct AppState {
    pub resolver: LocationResolver,
    pub limiter: RateLimiter,
}
