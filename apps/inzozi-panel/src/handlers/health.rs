use axum::{Json, extract::State};
use inzozi_shared::api::HealthResponse;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: state.storage.to_string(),
    })
}
