mod handlers;
mod rate_limit;
mod state;

use axum::http::{header, HeaderValue};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::location::{LocationResolver, OpenMeteoClient};

pub use handlers::CitiesResponse;
pub use rate_limit::RateLimiter;
pub use state::AppState;

/// Successful searches are query-keyed and not personalised, so shared
/// caches may keep them as long as the resolver does.
fn cache_control(ttl: Duration) -> Option<HeaderValue> {
    HeaderValue::try_from(format!("public, max-age={}", ttl.as_secs())).ok()
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_age = cache_control(state.resolver.settings().cache_ttl);
    let cache_success = move |res: &Response| -> Option<HeaderValue> {
        if res.status().is_success() {
            max_age.clone()
        } else {
            None
        }
    };
    let cities = get(handlers::cities).layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        cache_success,
    ));

    Router::new()
        .route("/api/cities", cities)
        .route_layer(from_fn_with_state(Arc::clone(&state), handlers::rate_limit))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire the production resolver from configuration.
pub fn state_from_config(config: &Config) -> Arc<AppState> {
    let geocoder = OpenMeteoClient::new(config.upstream.endpoint.clone())
        .with_user_agent(config.upstream.user_agent.clone());
    Arc::new(AppState {
        resolver: LocationResolver::new(Arc::new(geocoder), config.resolver_settings()),
        limiter: RateLimiter::per_minute(config.server.rate_limit_per_minute),
    })
}

pub async fn start(config: &Config) -> std::io::Result<()> {
    let app = build_router(state_from_config(config));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, upstream = %config.upstream.endpoint, "placeseek listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}
