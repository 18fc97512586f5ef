//! Liveness routes. Neither touches the provider.

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{AppState, DOCS_ROUTE, OPENAPI_ROUTE, SUPPRESSION_ROUTE};

/// `GET /` — liveness probe.
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(json!({
            "status": "healthy",
            "service": state.service.title,
            "version": state.service.version,
        })),
    )
}

/// `GET /health` — liveness plus service configuration and route list.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let suppression_path = SUPPRESSION_ROUTE.replace(":email", "{email}");
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(json!({
            "status": "ok",
            "service": state.service.title,
            "version": state.service.version,
            "region": state.service.region,
            "endpoints": {
                "health": "/health",
                "metrics": "/metrics",
                "docs": DOCS_ROUTE,
                "openapi": OPENAPI_ROUTE,
                "email_suppression": {
                    "check": format!("GET {}", suppression_path),
                    "remove": format!("DELETE {}", suppression_path),
                }
            }
        })),
    )
}
