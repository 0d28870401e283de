//! Caller-level rate limiting for the search endpoint.
//!
//! Fixed one-minute windows per client IP. Requests without a known peer
//! address share a single bucket.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    /// Requests allowed per window; zero disables limiting.
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<Option<IpAddr>, Window>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `client`. Returns false if it is over the limit.
    pub fn check(&self, client: Option<IpAddr>) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        clients.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = clients.entry(client).or_insert(Window { started: now, count: 0 });
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}
