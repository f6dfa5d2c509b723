//! Store interfaces consumed by the loan engine.
//!
//! Every call goes through a [`UnitOfWork`]: reads and writes made on it are
//! only visible to others after [`UnitOfWork::commit`]. Dropping a unit of
//! work without committing discards everything it wrote.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, Loan, LoanDetails, LoanFilter, Page, User},
};

#[async_trait]
pub trait BookStore: Send {
    /// Look up a book, locking it for the rest of the unit of work.
    async fn find_book(&mut self, id: Uuid) -> AppResult<Option<Book>>;

    async fn save_book(&mut self, book: Book) -> AppResult<Book>;
}

#[async_trait]
pub trait UserStore: Send {
    /// Look up a user by email (case-insensitive), locking it for the rest of
    /// the unit of work.
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;

    async fn save_user(&mut self, user: User) -> AppResult<User>;
}

#[async_trait]
pub trait LoanStore: Send {
    async fn find_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>>;

    /// Look up a loan only if it belongs to the user with this email.
    async fn find_loan_for_user(&mut self, id: Uuid, email: &str) -> AppResult<Option<Loan>>;

    /// Insert or update a loan.
    async fn save_loan(&mut self, loan: Loan) -> AppResult<Loan>;

    async fn loan_details(&mut self, id: Uuid) -> AppResult<Option<LoanDetails>>;

    /// Loans matching `filter`, ordered by loan date then id.
    async fn list_loans(&mut self, filter: &LoanFilter, page: &Page) -> AppResult<Vec<LoanDetails>>;
}

/// One atomic unit of work across the book, user and loan stores.
#[async_trait]
pub trait UnitOfWork: BookStore + UserStore + LoanStore {
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Opens units of work.
#[async_trait]
pub trait LoanStores: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}
