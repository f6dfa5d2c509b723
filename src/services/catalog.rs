//! Catalog service: books and their authors

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorData},
        book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
        Page,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get book with its authors
    pub async fn get_book(&self, id: Uuid) -> AppResult<BookDetails> {
        let book = self.repository.books.get_by_id(id).await?;
        let authors = self.repository.authors.get_for_book(id).await?;
        Ok(BookDetails { book, authors })
    }

    /// Create a new book, initially available
    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        data.validate()?;

        if self.repository.books.title_exists(&data.title, None).await? {
            return Err(AppError::Conflict(
                "A book with this title has already been registered".to_string(),
            ));
        }

        let book = self
            .repository
            .books
            .create(&Book::new(data.title, data.publication_date))
            .await?;

        tracing::info!(book_id = %book.id, "Book created");
        Ok(book)
    }

    /// Update a book's title and publication date
    pub async fn update_book(&self, id: Uuid, data: UpdateBook) -> AppResult<Book> {
        data.validate()?;

        if self.repository.books.title_exists(&data.title, Some(id)).await? {
            return Err(AppError::Conflict(
                "A book with this title has already been registered".to_string(),
            ));
        }

        self.repository.books.update(id, &data).await
    }

    /// Delete a book that is not on loan
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }

    /// List authors
    pub async fn list_authors(&self, page: &Page) -> AppResult<(Vec<Author>, i64)> {
        self.repository.authors.list(page).await
    }

    /// Get author by ID
    pub async fn get_author(&self, id: Uuid) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    /// Create a new author
    pub async fn create_author(&self, data: AuthorData) -> AppResult<Author> {
        data.validate()?;
        self.repository.authors.create(&Author::from_data(data)).await
    }

    /// Replace an author's data
    pub async fn update_author(&self, id: Uuid, data: AuthorData) -> AppResult<Author> {
        data.validate()?;
        let author = Author {
            id,
            ..Author::from_data(data)
        };
        self.repository.authors.update(&author).await
    }

    /// Delete an author
    pub async fn delete_author(&self, id: Uuid) -> AppResult<()> {
        self.repository.authors.delete(id).await
    }

    /// Associate an author with a book
    pub async fn add_author_to_book(&self, author_id: Uuid, book_id: Uuid) -> AppResult<BookDetails> {
        self.repository.authors.get_by_id(author_id).await?;
        self.repository.books.get_by_id(book_id).await?;
        self.repository.authors.add_to_book(author_id, book_id).await?;
        self.get_book(book_id).await
    }
}
