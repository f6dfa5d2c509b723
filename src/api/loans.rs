//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        loan::{CreateLoanRequest, LoanQuery},
        LoanDetails, Page, PageQuery,
    },
};

use super::AuthenticatedUser;

/// Borrow a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Caller is not the borrower"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "Book unavailable or user already holds a book")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    request.validate()?;

    let loan = state
        .services
        .loans
        .create_loan(&claims, request.book_id, &request.email)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get a loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_admin()?;

    let loan = state.services.loans.get_loan(id).await?;
    Ok(Json(loan))
}

/// List loans by active flag
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans ordered by loan date", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let page = Page::new(query.page, query.per_page);
    let loans = state.services.loans.list_by_active(query.active, page).await?;
    Ok(Json(loans))
}

/// List all loans of a user
#[utoipa::path(
    get,
    path = "/loans/user/{email}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "Borrower email"),
        PageQuery
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<LoanDetails>),
        (status = 403, description = "Caller is not the borrower")
    )
)]
pub async fn get_user_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(email): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_same_user(&email)?;

    let loans = state
        .services
        .loans
        .list_by_user(&email, Page::from(&query))
        .await?;
    Ok(Json(loans))
}

/// List a user's loans by active flag
#[utoipa::path(
    get,
    path = "/loans/user/{email}/{active}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "Borrower email"),
        ("active" = bool, Path, description = "Active flag"),
        PageQuery
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<LoanDetails>),
        (status = 403, description = "Caller is not the borrower")
    )
)]
pub async fn get_user_loans_by_active(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((email, active)): Path<(String, bool)>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_same_user(&email)?;

    let loans = state
        .services
        .loans
        .list_by_user_and_active(&email, active, Page::from(&query))
        .await?;
    Ok(Json(loans))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/return/{email}/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "Borrower email"),
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 204, description = "Book returned"),
        (status = 403, description = "Caller is not the borrower"),
        (status = 404, description = "Loan not found for this user"),
        (status = 409, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((email, id)): Path<(String, Uuid)>,
) -> AppResult<StatusCode> {
    state.services.loans.return_loan(&claims, id, &email).await?;
    Ok(StatusCode::NO_CONTENT)
}
