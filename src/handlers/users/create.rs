// handlers/users/create.rs - POST /api/users handler

use axum::{body::Bytes, extract::State};

use crate::database::{StoreError, User, UserStore};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::body::UserBody;

/// POST /api/users - Create a user from `{first_name, last_name, biography}`
///
/// Malformed JSON is a 422, an empty field a 400. Responds 201 with the new record.
pub async fn user_create(State(store): State<UserStore>, body: Bytes) -> ApiResult<User> {
    let body = UserBody::decode(&body).map_err(|e| {
        tracing::warn!("create user: undecodable body: {}", e);
        ApiError::unprocessable_entity("Invalid body")
    })?;

    body.validate().map_err(|e| {
        tracing::warn!("create user: {}", e);
        e
    })?;

    let user = store
        .insert(&body.first_name, &body.last_name, &body.biography)
        .await
        .map_err(|e| match e {
            StoreError::Internal(msg) => {
                tracing::error!("create user: insert failed: {}", msg);
                ApiError::internal_server_error(
                    "There was an error while saving the user to the database",
                )
            }
            other => other.into(),
        })?;

    tracing::info!(id = %user.id, "created user");
    Ok(ApiResponse::created(user))
}
