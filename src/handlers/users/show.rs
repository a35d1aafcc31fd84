// handlers/users/show.rs - GET /api/users/:id handler

use axum::extract::{Path, State};

use crate::database::{User, UserStore};
use crate::middleware::{ApiResponse, ApiResult};

pub async fn user_show(
    State(store): State<UserStore>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let user = store.find_by_id(&id).await?;
    Ok(ApiResponse::success(user))
}
