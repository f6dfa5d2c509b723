//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        user::{CreateUser, UpdateUser},
        Page, PageQuery, User,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List users with pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "List of users", body = PaginatedResponse<User>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<User>>> {
    claims.require_admin()?;

    let page = Page::from(&query);
    let (users, total) = state.services.users.list(&page).await?;

    Ok(Json(PaginatedResponse {
        items: users,
        total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    claims.require_admin()?;

    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// Register a new reader account
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let created = state.services.users.register(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update the caller's own account
#[utoipa::path(
    put,
    path = "/users/{email}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "Account email")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Not the account owner"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(email): Path<String>,
    Json(data): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    claims.require_same_user(&email)?;

    let user = state.services.users.update(&email, data).await?;
    Ok(Json(user))
}

/// Delete the caller's own account
#[utoipa::path(
    delete,
    path = "/users/{email}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "Account email")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Not the account owner"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User has an active loan")
    )
)]
pub async fn delete_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(email): Path<String>,
) -> AppResult<StatusCode> {
    claims.require_same_user(&email)?;

    state.services.users.delete(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}
