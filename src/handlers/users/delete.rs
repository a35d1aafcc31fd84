// handlers/users/delete.rs - DELETE /api/users/:id handler

use axum::extract::{Path, State};

use crate::database::{User, UserStore};
use crate::middleware::{ApiResponse, ApiResult};

/// Responds with the record as it was just before removal
pub async fn user_delete(
    State(store): State<UserStore>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let user = store.delete(&id).await?;
    tracing::info!(id = %user.id, "deleted user");
    Ok(ApiResponse::success(user))
}
