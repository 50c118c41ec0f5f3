use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::store::{Store, StoreStats};
use crate::util::time::elapsed_ms;

#[derive(Debug, Serialize)]
pub struct StatusBody {
    loaded: bool,
    #[serde(flatten)]
    stats: StoreStats,
    /// Age of the live snapshot, absent before the first load
    age_ms: Option<u64>,
}

/// GET /status: live snapshot statistics
pub async fn status(State(store): State<Arc<Store>>) -> Json<StatusBody> {
    let stats = store.stats();
    let loaded = stats.generation > 0;
    Json(StatusBody {
        loaded,
        age_ms: loaded.then(|| elapsed_ms(stats.loaded_at_ms)),
        stats,
    })
}
