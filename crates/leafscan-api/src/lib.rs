//! REST surface over the record store and the identification gateway.

pub mod plants;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};

use leafscan_identify::PlantIdentifier;
use leafscan_store::RecordStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<dyn RecordStore>,
    pub identifier: Arc<dyn PlantIdentifier>,
}

impl AppStateInner {
    pub fn new(store: Arc<dyn RecordStore>, identifier: Arc<dyn PlantIdentifier>) -> AppState {
        Arc::new(Self { store, identifier })
    }
}

/// Plant routes under `/api` plus the `/health` probe.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/plants",
            get(plants::list_plants).delete(plants::delete_all_plants),
        )
        .route("/plants/identify", post(plants::identify_plant))
        .route(
            "/plants/{id}",
            get(plants::get_plant).delete(plants::delete_plant),
        )
        .route("/plants/{id}/count", patch(plants::increment_count))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}
