//! Data models for the library server

pub mod author;
pub mod book;
pub mod loan;
pub mod page;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookDetails, BookStatus};
pub use loan::{Loan, LoanDetails, LoanFilter, LoanState};
pub use page::{Page, PageQuery};
pub use user::{Role, User, UserClaims};
