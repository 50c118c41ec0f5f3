use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::warn;

use crate::api::promotion::{lookup_promotion, missing_id};
use crate::api::status::status;
use crate::store::Store;

/// Read-only routes over the promotion store. Responses that take longer
/// than `response_timeout` to produce are answered with 503.
pub fn router(store: Arc<Store>, response_timeout: Duration) -> Router {
    Router::new()
        .route("/promotions/", get(missing_id))
        .route("/promotions/{*id}", get(lookup_promotion))
        .route("/status", get(status))
        .fallback(not_found)
        .with_state(store)
        .layer(middleware::from_fn_with_state(response_timeout, bound_response))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

async fn bound_response(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Response for {} not ready within {:?}", path, limit);
            (StatusCode::SERVICE_UNAVAILABLE, "response timed out\n").into_response()
        }
    }
}
