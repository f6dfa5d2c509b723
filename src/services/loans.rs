//! Loan lifecycle service.
//!
//! Borrowing and returning touch three records at once: the loan, the book's
//! availability status and the borrower's `can_borrow` flag. Both operations
//! run inside a single unit of work so that the invariants
//!
//! - a book is UNAVAILABLE iff exactly one active loan references it
//! - a user cannot borrow iff exactly one active loan references them
//!
//! hold after every commit, and a failure at any step leaves nothing behind.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{BookStatus, Loan, LoanDetails, LoanFilter, Page, UserClaims},
    repository::store::{BookStore, LoanStore, LoanStores, UnitOfWork, UserStore},
};

use super::clock::Clock;

#[derive(Clone)]
pub struct LoansService {
    stores: Arc<dyn LoanStores>,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(stores: Arc<dyn LoanStores>, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    /// Borrow a book for the user with `user_email`.
    ///
    /// The caller must be that user. Fails with `NotFound` for an unknown book
    /// or user and with `Conflict` when the book is out or the user already
    /// holds a book.
    pub async fn create_loan(
        &self,
        caller: &UserClaims,
        book_id: Uuid,
        user_email: &str,
    ) -> AppResult<LoanDetails> {
        caller.require_same_user(user_email)?;

        let mut uow = self.stores.begin().await?;

        let mut book = uow
            .find_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No book with id {} could be found", book_id)))?;

        if !book.is_available() {
            return Err(AppError::Conflict("Book unavailable".to_string()));
        }

        let mut user = uow
            .find_user_by_email(user_email)
            .await?
            .ok_or_else(|| AppError::NotFound("No user with this email could be found".to_string()))?;

        if !user.can_borrow {
            return Err(AppError::Conflict(
                "Loan unavailable: user already has an active loan".to_string(),
            ));
        }

        let loan = uow
            .save_loan(Loan::open(book.id, user.id, self.clock.today()))
            .await?;

        book.status = BookStatus::Unavailable;
        let book = uow.save_book(book).await?;

        user.can_borrow = false;
        let user = uow.save_user(user).await?;

        uow.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            book_id = %book.id,
            user_id = %user.id,
            due_date = %loan.due_date,
            "Loan created"
        );

        Ok(LoanDetails::new(loan, book, user.email))
    }

    /// Return a loan held by the user with `user_email`.
    ///
    /// A loan belonging to someone else is reported as not found.
    pub async fn return_loan(
        &self,
        caller: &UserClaims,
        loan_id: Uuid,
        user_email: &str,
    ) -> AppResult<Loan> {
        caller.require_same_user(user_email)?;

        let mut uow = self.stores.begin().await?;

        let mut loan = uow
            .find_loan_for_user(loan_id, user_email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    "No loan with this id can be found associated with this email".to_string(),
                )
            })?;

        loan.mark_returned(self.clock.now())?;

        let mut book = uow.find_book(loan.book_id).await?.ok_or_else(|| {
            AppError::Internal(format!("Loan {} references missing book {}", loan.id, loan.book_id))
        })?;

        let mut user = uow.find_user_by_email(user_email).await?.ok_or_else(|| {
            AppError::Internal(format!("Loan {} references a missing user", loan.id))
        })?;

        let loan = uow.save_loan(loan).await?;

        book.status = BookStatus::Available;
        uow.save_book(book).await?;

        user.can_borrow = true;
        uow.save_user(user).await?;

        uow.commit().await?;

        tracing::info!(loan_id = %loan.id, book_id = %loan.book_id, "Loan returned");

        Ok(loan)
    }

    /// Get a loan by ID
    pub async fn get_loan(&self, loan_id: Uuid) -> AppResult<LoanDetails> {
        let mut uow = self.stores.begin().await?;
        uow.loan_details(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No loan with id {} could be found", loan_id)))
    }

    /// List loans by active flag
    pub async fn list_by_active(&self, active: bool, page: Page) -> AppResult<Vec<LoanDetails>> {
        self.list(LoanFilter::by_active(active), page).await
    }

    /// List all loans of a user
    pub async fn list_by_user(&self, email: &str, page: Page) -> AppResult<Vec<LoanDetails>> {
        self.list(LoanFilter::by_user(email), page).await
    }

    /// List a user's loans by active flag
    pub async fn list_by_user_and_active(
        &self,
        email: &str,
        active: bool,
        page: Page,
    ) -> AppResult<Vec<LoanDetails>> {
        self.list(LoanFilter::by_user_and_active(email, active), page).await
    }

    async fn list(&self, filter: LoanFilter, page: Page) -> AppResult<Vec<LoanDetails>> {
        let mut uow = self.stores.begin().await?;
        uow.list_loans(&filter, &page).await
    }
}
