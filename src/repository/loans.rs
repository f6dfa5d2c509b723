//! PostgreSQL loan stores.
//!
//! Each unit of work wraps one database transaction. Book, user and loan rows
//! read through it are locked with `FOR UPDATE`, so two concurrent borrow
//! requests for the same book serialize on the book row and the second one
//! sees it UNAVAILABLE. The partial unique indexes on `loans` reject a second
//! active loan per book or per user even if a caller skips the lookups.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, Pool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{BookStore, LoanStore, LoanStores, UnitOfWork, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BookStatus, Loan, LoanDetails, LoanFilter, Page, User},
};

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.loan_date, l.due_date, l.returned_at, l.active,
           b.id AS book_id, b.title, b.publication_date, b.status,
           u.email AS user_email
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

/// Internal row structure for loan detail queries
#[derive(Debug, FromRow)]
struct LoanDetailsRow {
    id: Uuid,
    loan_date: NaiveDate,
    due_date: NaiveDate,
    returned_at: Option<DateTime<Utc>>,
    active: bool,
    book_id: Uuid,
    title: String,
    publication_date: NaiveDate,
    status: BookStatus,
    user_email: String,
}

impl From<LoanDetailsRow> for LoanDetails {
    fn from(row: LoanDetailsRow) -> Self {
        LoanDetails {
            id: row.id,
            loan_date: row.loan_date,
            due_date: row.due_date,
            returned_at: row.returned_at,
            active: row.active,
            book: Book {
                id: row.book_id,
                title: row.title,
                publication_date: row.publication_date,
                status: row.status,
            },
            user_email: row.user_email,
        }
    }
}

#[derive(Clone)]
pub struct PgLoanStores {
    pool: Pool<Postgres>,
}

impl PgLoanStores {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanStores for PgLoanStores {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookStore for PgUnitOfWork {
    async fn find_book(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(book)
    }

    async fn save_book(&mut self, book: Book) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET title = $2, publication_date = $3, status = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(book.publication_date)
        .bind(book.status)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book.id)))
    }
}

#[async_trait]
impl UserStore for PgUnitOfWork {
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn save_user(&mut self, user: User) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, password = $5,
                birth_date = $6, role = $7, can_borrow = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.birth_date)
        .bind(user.role)
        .bind(user.can_borrow)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user.id)))
    }
}

#[async_trait]
impl LoanStore for PgUnitOfWork {
    async fn find_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(loan)
    }

    async fn find_loan_for_user(&mut self, id: Uuid, email: &str) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT l.* FROM loans l
            JOIN users u ON u.id = l.user_id
            WHERE l.id = $1 AND LOWER(u.email) = LOWER($2)
            FOR UPDATE OF l
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn save_loan(&mut self, loan: Loan) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (id, book_id, user_id, loan_date, due_date, returned_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET returned_at = EXCLUDED.returned_at, active = EXCLUDED.active
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(loan.returned_at)
        .bind(loan.active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_constraint(e, "Book or user already has an active loan"))
    }

    async fn loan_details(&mut self, id: Uuid) -> AppResult<Option<LoanDetails>> {
        let row = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            "{} WHERE l.id = $1",
            LOAN_DETAILS_SELECT
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_loans(&mut self, filter: &LoanFilter, page: &Page) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            r#"
            {}
            WHERE ($1::BOOLEAN IS NULL OR l.active = $1)
              AND ($2::TEXT IS NULL OR LOWER(u.email) = LOWER($2))
            ORDER BY l.loan_date, l.id
            LIMIT $3 OFFSET $4
            "#,
            LOAN_DETAILS_SELECT
        ))
        .bind(filter.active)
        .bind(filter.user_email.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let uow = *self;
        uow.tx.commit().await?;
        Ok(())
    }
}
