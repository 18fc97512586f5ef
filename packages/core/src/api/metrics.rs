use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};

use super::AppState;

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let (status, content_type, body) = match state.metrics.render() {
        Ok(body) => (StatusCode::OK, "text/plain; version=0.0.4", body),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "metrics error".to_string())
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}
