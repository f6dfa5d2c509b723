//! Library loans server
//!
//! REST JSON API for a small lending library: books and their authors,
//! reader accounts, and the loan engine that keeps book availability and
//! borrower eligibility consistent with the loan records.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
