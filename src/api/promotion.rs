use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use crate::api::router::not_found;
use crate::store::{Store, StoreError};

/// GET /promotions/{id}
pub async fn lookup_promotion(State(store): State<Arc<Store>>, Path(id): Path<String>) -> Response {
    match store.lookup_str(&id) {
        Ok(Some(record)) => json_line(&record),
        Ok(None) => not_found().await,
        Err(StoreError::InvalidIdentifier(id)) => {
            debug!("Rejecting promotion lookup with invalid id '{}'", id);
            invalid_id()
        }
    }
}

/// GET /promotions/ with nothing after the prefix
pub async fn missing_id() -> Response {
    invalid_id()
}

fn invalid_id() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid ID\n").into_response()
}

/// JSON body terminated by a newline
fn json_line<T: Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(mut body) => {
            body.push('\n');
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            error!("Failed to encode response body: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
