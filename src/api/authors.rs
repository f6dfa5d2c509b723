//! Author endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{author::AuthorData, Author, BookDetails, Page, PageQuery},
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List authors
#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    params(PageQuery),
    responses(
        (status = 200, description = "List of authors", body = PaginatedResponse<Author>)
    )
)]
pub async fn list_authors(
    State(state): State<crate::AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<Author>>> {
    let page = Page::from(&query);
    let (authors, total) = state.services.catalog.list_authors(&page).await?;

    Ok(Json(PaginatedResponse {
        items: authors,
        total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// Get author by ID
#[utoipa::path(
    get,
    path = "/authors/{id}",
    tag = "authors",
    params(
        ("id" = Uuid, Path, description = "Author ID")
    ),
    responses(
        (status = 200, description = "Author details", body = Author),
        (status = 404, description = "Author not found")
    )
)]
pub async fn get_author(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Author>> {
    let author = state.services.catalog.get_author(id).await?;
    Ok(Json(author))
}

/// Create a new author
#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = AuthorData,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn create_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<AuthorData>,
) -> AppResult<(StatusCode, Json<Author>)> {
    claims.require_admin()?;

    let author = state.services.catalog.create_author(data).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Replace an author's data
#[utoipa::path(
    put,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Author ID")
    ),
    request_body = AuthorData,
    responses(
        (status = 200, description = "Author updated", body = Author),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn update_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<AuthorData>,
) -> AppResult<Json<Author>> {
    claims.require_admin()?;

    let author = state.services.catalog.update_author(id, data).await?;
    Ok(Json(author))
}

/// Delete an author
#[utoipa::path(
    delete,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Author ID")
    ),
    responses(
        (status = 204, description = "Author deleted"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn delete_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.catalog.delete_author(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Associate an author with a book
#[utoipa::path(
    post,
    path = "/authors/{id}/books/{book_id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Author ID"),
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book with its authors", body = BookDetails),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Author or book not found")
    )
)]
pub async fn add_author_to_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((author_id, book_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<BookDetails>> {
    claims.require_admin()?;

    let book = state.services.catalog.add_author_to_book(author_id, book_id).await?;
    Ok(Json(book))
}
