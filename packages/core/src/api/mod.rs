//! HTTP facade: route table, shared state and request middleware.

pub mod health;
pub mod metrics;
pub mod suppression;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::metrics::AppMetrics;
use crate::suppression::SuppressionLookup;

pub const SUPPRESSION_ROUTE: &str = "/api/v1/email-suppression/:email";
pub const DOCS_ROUTE: &str = "/docs";
pub const OPENAPI_ROUTE: &str = "/openapi.json";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Static facts about the running service, shown by the health routes.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub title: String,
    pub version: String,
    pub region: String,
}

/// State shared by every route. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub suppressions: Arc<dyn SuppressionLookup + Send + Sync>,
    pub service: Arc<ServiceInfo>,
    pub metrics: Arc<AppMetrics>,
}

#[derive(OpenApi)]
#[openapi(
    paths(suppression::check_suppression, suppression::remove_suppression),
    components(schemas(
        suppression::CheckSuppressionResponse,
        suppression::RemoveSuppressionResponse,
        crate::suppression::SuppressionEntry,
        crate::error::ErrorResponse,
    )),
    info(description = "Check and remove addresses on the OCI Email Delivery suppression list"),
    tags((name = "Email Suppression", description = "Suppression list lookups and removals"))
)]
pub struct ApiDoc;

/// OpenAPI document carrying the running service's title and version.
pub fn openapi(service: &ServiceInfo) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = service.title.clone();
    doc.info.version = service.version.clone();
    doc
}

/// Assemble the full application router.
pub fn router(state: AppState) -> Router {
    let docs = SwaggerUi::new(DOCS_ROUTE).url(OPENAPI_ROUTE, openapi(&state.service));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .route(
            SUPPRESSION_ROUTE,
            get(suppression::check_suppression).delete(suppression::remove_suppression),
        )
        .merge(docs)
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Span wrapping every request, keyed by route and request id.
fn request_span(request: &Request<Body>) -> tracing::Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or("unmatched");
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        route,
        request_id
    )
}

/// Record request count and latency per matched route.
async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), route.as_str(), status.as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(start.elapsed().as_secs_f64());

    response
}
