//! In-memory loan stores.
//!
//! Units of work are serialized behind an async mutex: `begin` takes the lock
//! and a working copy of the tables, `commit` writes the copy back. Dropping
//! the unit of work releases the lock and discards the copy.
//!
//! Fault injection (`FailPoint`) is only compiled for unit tests and under
//! the `test-util` feature.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{BookStore, LoanStore, LoanStores, UnitOfWork, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanDetails, LoanFilter, Page, User},
};

/// Write that should fail once, for exercising rollbacks.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SaveBook,
    SaveUser,
    SaveLoan,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    books: HashMap<Uuid, Book>,
    users: HashMap<Uuid, User>,
    loans: HashMap<Uuid, Loan>,
}

impl Tables {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.has_email(email))
    }

    fn details(&self, loan: &Loan) -> AppResult<LoanDetails> {
        let book = self.books.get(&loan.book_id).cloned().ok_or_else(|| {
            AppError::Internal(format!("Loan {} references a missing book", loan.id))
        })?;
        let user = self.users.get(&loan.user_id).ok_or_else(|| {
            AppError::Internal(format!("Loan {} references a missing user", loan.id))
        })?;
        Ok(LoanDetails::new(loan.clone(), book, user.email.clone()))
    }

    fn matches(&self, loan: &Loan, filter: &LoanFilter) -> bool {
        if filter.active.is_some_and(|active| loan.active != active) {
            return false;
        }
        match &filter.user_email {
            Some(email) => self
                .users
                .get(&loan.user_id)
                .is_some_and(|u| u.has_email(email)),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    #[cfg(any(test, feature = "test-util"))]
    fail_on: Option<FailPoint>,
}

#[derive(Clone, Default)]
pub struct MemoryLoanStores {
    state: Arc<Mutex<State>>,
}

impl MemoryLoanStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_book(&self, book: Book) {
        self.state.lock().await.tables.books.insert(book.id, book);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.tables.users.insert(user.id, user);
    }

    pub async fn book(&self, id: Uuid) -> Option<Book> {
        self.state.lock().await.tables.books.get(&id).cloned()
    }

    pub async fn user(&self, id: Uuid) -> Option<User> {
        self.state.lock().await.tables.users.get(&id).cloned()
    }

    pub async fn loans(&self) -> Vec<Loan> {
        self.state.lock().await.tables.loans.values().cloned().collect()
    }

    /// Make the next matching write fail with an internal error.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn fail_next(&self, point: FailPoint) {
        self.state.lock().await.fail_on = Some(point);
    }
}

#[async_trait]
impl LoanStores for MemoryLoanStores {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.tables.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: Tables,
}

impl MemoryUnitOfWork {
    #[cfg(any(test, feature = "test-util"))]
    fn check_fail_point(&mut self, point: FailPoint) -> AppResult<()> {
        if self.guard.fail_on == Some(point) {
            self.guard.fail_on = None;
            return Err(AppError::Internal(format!("Injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl BookStore for MemoryUnitOfWork {
    async fn find_book(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn save_book(&mut self, book: Book) -> AppResult<Book> {
        #[cfg(any(test, feature = "test-util"))]
        self.check_fail_point(FailPoint::SaveBook)?;
        if !self.working.books.contains_key(&book.id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", book.id)));
        }
        self.working.books.insert(book.id, book.clone());
        Ok(book)
    }
}

#[async_trait]
impl UserStore for MemoryUnitOfWork {
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        Ok(self.working.user_by_email(email).cloned())
    }

    async fn save_user(&mut self, user: User) -> AppResult<User> {
        #[cfg(any(test, feature = "test-util"))]
        self.check_fail_point(FailPoint::SaveUser)?;
        if !self.working.users.contains_key(&user.id) {
            return Err(AppError::NotFound(format!("User with id {} not found", user.id)));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl LoanStore for MemoryUnitOfWork {
    async fn find_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.working.loans.get(&id).cloned())
    }

    async fn find_loan_for_user(&mut self, id: Uuid, email: &str) -> AppResult<Option<Loan>> {
        let Some(loan) = self.working.loans.get(&id) else {
            return Ok(None);
        };
        let owned = self
            .working
            .users
            .get(&loan.user_id)
            .is_some_and(|u| u.has_email(email));
        Ok(owned.then(|| loan.clone()))
    }

    async fn save_loan(&mut self, loan: Loan) -> AppResult<Loan> {
        #[cfg(any(test, feature = "test-util"))]
        self.check_fail_point(FailPoint::SaveLoan)?;
        // Mirrors the one-active-loan-per-book/user unique indexes
        if loan.active {
            let clash = self.working.loans.values().any(|other| {
                other.id != loan.id
                    && other.active
                    && (other.book_id == loan.book_id || other.user_id == loan.user_id)
            });
            if clash {
                return Err(AppError::Conflict(
                    "Book or user already has an active loan".to_string(),
                ));
            }
        }
        self.working.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn loan_details(&mut self, id: Uuid) -> AppResult<Option<LoanDetails>> {
        self.working
            .loans
            .get(&id)
            .map(|loan| self.working.details(loan))
            .transpose()
    }

    async fn list_loans(&mut self, filter: &LoanFilter, page: &Page) -> AppResult<Vec<LoanDetails>> {
        let mut loans: Vec<&Loan> = self
            .working
            .loans
            .values()
            .filter(|loan| self.working.matches(loan, filter))
            .collect();
        loans.sort_by_key(|loan| (loan.loan_date, loan.id));

        loans
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .map(|loan| self.working.details(loan))
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        guard.tables = working;
        Ok(())
    }
}
