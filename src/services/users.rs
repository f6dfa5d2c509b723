//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::NaiveDate;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        user::{CreateUser, UpdateUser},
        Page, Role, User, UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate user by email and return a JWT token
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<String> {
        let user = self
            .repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&user.password, password)? {
            tracing::warn!(user_id = %user.id, "Failed login attempt");
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        self.issue_token(&user)
    }

    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        UserClaims::for_user(user, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Register a new reader account
    pub async fn register(&self, data: CreateUser) -> AppResult<User> {
        data.validate()?;

        if self.repository.users.email_exists(&data.email, None).await? {
            return Err(AppError::Conflict(
                "A user with this email has already been registered".to_string(),
            ));
        }

        let hash = hash_password(&data.password)?;
        let user = self.repository.users.create(&User::new(data, hash)).await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// List users with pagination
    pub async fn list(&self, page: &Page) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.list(page).await
    }

    /// Update the account identified by `email`
    pub async fn update(&self, email: &str, data: UpdateUser) -> AppResult<User> {
        data.validate()?;

        let mut user = self.find_by_email(email).await?;

        if self.repository.users.email_exists(&data.email, Some(user.id)).await? {
            return Err(AppError::Conflict(
                "A user with this email has already been registered".to_string(),
            ));
        }

        user.first_name = data.first_name;
        user.last_name = data.last_name;
        user.email = data.email;
        user.password = hash_password(&data.password)?;
        user.birth_date = data.birth_date;

        self.repository.users.update_profile(&user).await
    }

    /// Delete the account identified by `email`
    pub async fn delete(&self, email: &str) -> AppResult<()> {
        let user = self.find_by_email(email).await?;
        self.repository.users.delete(user.id).await?;

        tracing::info!(user_id = %user.id, "User deleted");
        Ok(())
    }

    /// Create the configured administrator account if it does not exist yet
    pub async fn ensure_admin(&self) -> AppResult<()> {
        let (Some(email), Some(password)) =
            (&self.config.admin_email, &self.config.admin_password)
        else {
            return Ok(());
        };

        if self.repository.users.get_by_email(email).await?.is_some() {
            return Ok(());
        }

        let mut admin = User::new(
            CreateUser {
                first_name: "Library".to_string(),
                last_name: "Administrator".to_string(),
                email: email.clone(),
                password: password.clone(),
                birth_date: NaiveDate::default(),
            },
            hash_password(password)?,
        );
        admin.role = Role::Admin;

        self.repository.users.create(&admin).await?;
        tracing::info!("Administrator account {} created", email);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        self.repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("No user with this email found".to_string()))
    }
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
