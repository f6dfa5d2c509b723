//! Loan model and related types

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::book::Book;
use crate::error::{AppError, AppResult};

/// Borrowing window, counted from the loan date
pub const LOAN_DURATION_DAYS: i64 = 7;

/// Lifecycle state of a loan. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanState {
    Active,
    Returned,
}

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Loan {
    /// Open a new active loan starting on `today`.
    pub fn open(book_id: Uuid, user_id: Uuid, today: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            user_id,
            loan_date: today,
            due_date: today + Duration::days(LOAN_DURATION_DAYS),
            returned_at: None,
            active: true,
        }
    }

    pub fn state(&self) -> LoanState {
        if self.active {
            LoanState::Active
        } else {
            LoanState::Returned
        }
    }

    /// ACTIVE -> RETURNED. The due date is left untouched.
    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        match self.state() {
            LoanState::Returned => Err(AppError::Conflict("Loan already returned".to_string())),
            LoanState::Active => {
                self.active = false;
                self.returned_at = Some(now);
                Ok(())
            }
        }
    }
}

/// Loan with the borrowed book and the borrower's email for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: Uuid,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub book: Book,
    pub user_email: String,
}

impl LoanDetails {
    pub fn new(loan: Loan, book: Book, user_email: String) -> Self {
        Self {
            id: loan.id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            returned_at: loan.returned_at,
            active: loan.active,
            book,
            user_email,
        }
    }
}

/// Filter for loan listings. `None` fields are not constrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub active: Option<bool>,
    pub user_email: Option<String>,
}

impl LoanFilter {
    pub fn by_active(active: bool) -> Self {
        Self {
            active: Some(active),
            user_email: None,
        }
    }

    pub fn by_user(email: &str) -> Self {
        Self {
            active: None,
            user_email: Some(email.to_string()),
        }
    }

    pub fn by_user_and_active(email: &str, active: bool) -> Self {
        Self {
            active: Some(active),
            user_email: Some(email.to_string()),
        }
    }
}

/// Create loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    pub book_id: Uuid,
    /// Borrower email, must be the authenticated user
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Loan listing by active flag
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub active: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
