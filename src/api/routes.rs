//! Route definitions and request middleware.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::auth::auth_middleware;
use super::handlers::{health, payments, refunds, webhooks};
use super::state::AppState;

/// Request attribution header, echoed or generated.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inbound id propagated to handlers and the response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Echo an inbound `X-Request-Id` or mint a fresh 128-bit one. The id is
/// placed on the request (so the trace span and handlers see it) and on the
/// response.
async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let id = request
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(header_name.clone(), value);
    }
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(header_name, value);
    }
    response
}

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let merchant_routes = Router::new()
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/refunds", post(refunds::create_refund))
        .route("/payments/:id/refundable", get(refunds::get_refundable))
        .route("/refunds/:id", get(refunds::get_refund))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Provider webhooks authenticate by signature, not API key.
    let provider_routes = Router::new().route("/webhooks/:provider", post(webhooks::provider_webhook));

    Router::new()
        .nest("/api/v1", merchant_routes.merge(provider_routes))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                let traceparent = request
                    .headers()
                    .get("traceparent")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                    traceparent = %traceparent,
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
