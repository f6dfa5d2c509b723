//! Books repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, UpdateBook},
        Page,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Check if a title is already registered
    pub async fn title_exists(&self, title: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE LOWER(title) = LOWER($1) AND ($2::UUID IS NULL OR id != $2))",
        )
        .bind(title)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = Page::new(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT b.* FROM books b");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Insert a new book
    pub async fn create(&self, book: &Book) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (id, title, publication_date, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(book.publication_date)
        .bind(book.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_constraint(e, "A book with this title has already been registered"))
    }

    /// Update title and publication date. The status column is left alone.
    pub async fn update(&self, id: Uuid, data: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET title = $2, publication_date = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(data.publication_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_constraint(e, "A book with this title has already been registered"))?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book that is not on loan
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM books WHERE id = $1 AND status = 'AVAILABLE'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_constraint(e, "Book has loan history and cannot be deleted"))?
            .rows_affected();

        if deleted == 0 {
            // Either missing or currently on loan
            let book = self.get_by_id(id).await?;
            return Err(AppError::Conflict(format!(
                "Book {} is on loan and cannot be deleted",
                book.id
            )));
        }

        Ok(())
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    builder.push(" WHERE TRUE");

    if let Some(ref title) = query.title {
        builder
            .push(" AND b.title ILIKE ")
            .push_bind(contains_pattern(title));
    }

    if let Some(ref author) = query.author {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM books_authors ba JOIN authors a ON a.id = ba.author_id \
                 WHERE ba.book_id = b.id AND a.last_name ILIKE ",
            )
            .push_bind(contains_pattern(author))
            .push(")");
    }

    if let Some(status) = query.status {
        builder.push(" AND b.status = ").push_bind(status);
    }
}

/// ILIKE pattern matching `text` literally anywhere in the column.
/// Backslash is the default LIKE escape character in PostgreSQL.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
