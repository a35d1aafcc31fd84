// handlers/health.rs - GET /health handler

use axum::extract::State;
use serde::Serialize;

use crate::database::UserStore;
use crate::middleware::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub users: usize,
}

pub async fn health(State(store): State<UserStore>) -> ApiResponse<HealthStatus> {
    ApiResponse::success(HealthStatus {
        status: "ok",
        timestamp: chrono::Utc::now(),
        users: store.len().await,
    })
}
