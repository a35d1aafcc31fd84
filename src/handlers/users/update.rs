// handlers/users/update.rs - PUT /api/users/:id handler

use axum::{
    body::Bytes,
    extract::{Path, State},
};

use crate::database::{User, UserStore};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::body::UserBody;

/// PUT /api/users/:id - Replace every field of an existing user
///
/// Unlike create, an undecodable body is answered with 500 rather than 422.
pub async fn user_update(
    State(store): State<UserStore>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<User> {
    let body = UserBody::decode(&body).map_err(|e| {
        tracing::warn!(id = %id, "update user: undecodable body: {}", e);
        ApiError::internal_server_error("invalid body")
    })?;

    body.validate().map_err(|e| {
        tracing::warn!(id = %id, "update user: {}", e);
        e
    })?;

    let user = store
        .update(&id, &body.first_name, &body.last_name, &body.biography)
        .await?;

    tracing::info!(id = %user.id, "updated user");
    Ok(ApiResponse::success(user))
}
