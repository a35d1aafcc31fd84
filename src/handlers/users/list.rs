// handlers/users/list.rs - GET /api/users handler

use axum::extract::State;

use crate::database::{User, UserStore};
use crate::middleware::ApiResponse;

pub async fn user_list(State(store): State<UserStore>) -> ApiResponse<Vec<User>> {
    let users = store.find_all().await;
    tracing::debug!(count = users.len(), "listed users");
    ApiResponse::success(users)
}
