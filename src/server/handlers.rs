use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::location::{validate_query, CityOption, LocationError};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Rejection by this server's own per-client limiter.
    pub fn client_rate_limited() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "RATE_LIMITED",
            message: "Too many requests from this client, try again in a minute".into(),
        }
    }

    fn status_for(err: &LocationError) -> StatusCode {
        match err {
            LocationError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            LocationError::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            LocationError::UpstreamBadResponse(_) => StatusCode::BAD_GATEWAY,
            LocationError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LocationError::UpstreamTimeout | LocationError::ResolveTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<LocationError> for ApiError {
    fn from(err: LocationError) -> Self {
        Self {
            status: Self::status_for(&err),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

// ─── GET /api/cities ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CitiesQuery {
    pub q: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CitiesResponse {
    pub cities: Vec<CityOption>,
}

pub async fn cities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CitiesQuery>,
) -> Result<Json<CitiesResponse>, ApiError> {
    let start = Instant::now();

    let query = validate_query(params.q.as_deref())?;

    let cities = state.resolver.resolve(query).await.map_err(|e| {
        tracing::warn!(query, code = e.code(), error = %e, "GET /api/cities failed");
        e
    })?;

    tracing::info!(
        query,
        results = cities.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "GET /api/cities"
    );

    Ok(Json(CitiesResponse { cities }))
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ─── Rate limiting ───────────────────────────────────────────────

pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if !state.limiter.check(client) {
        tracing::warn!(client = ?client, "rate limit exceeded");
        return ApiError::client_rate_limited().into_response();
    }

    next.run(req).await
}
