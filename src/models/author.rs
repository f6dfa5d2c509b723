//! Author model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Author model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub nationality: String,
}

/// Create or replace author request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AuthorData {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub birth_date: NaiveDate,
    #[validate(length(min = 1, message = "Nationality is required"))]
    pub nationality: String,
}

impl Author {
    pub fn from_data(data: AuthorData) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: data.first_name,
            last_name: data.last_name,
            birth_date: data.birth_date,
            nationality: data.nationality,
        }
    }
}
