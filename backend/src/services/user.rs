//! User administration service

use bcrypt::{hash, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    validate_password, validate_phone, Actor, Capability, Entity, PaginatedResponse,
    PaginationMeta, Pagination, Role, User, WorkflowError,
};

use crate::error::{AppError, AppResult};

/// User row as stored, including the password hash
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str =
    "id, email, password_hash, role, first_name, last_name, phone, is_active, created_at";

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            role: row.role.parse().map_err(AppError::Internal)?,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// Input for creating a user account
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
    pub role: Role,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    pub phone: Option<String>,
}

impl CreateUserInput {
    /// Field checks shared by self-registration and staff creation
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        validate_password(&self.password).map_err(|msg| AppError::Validation {
            field: "password".to_string(),
            message: msg.to_string(),
        })?;
        if let Some(phone) = &self.phone {
            validate_phone(phone).map_err(|msg| AppError::Validation {
                field: "phone".to_string(),
                message: msg.to_string(),
            })?;
        }
        Ok(())
    }
}

/// User administration service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Insert a user after validation and an email uniqueness check
    pub async fn insert(&self, input: CreateUserInput) -> AppResult<User> {
        input.check()?;
        let email = input.email.trim().to_lowercase();

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&self.db)
            .await?;

        if existing > 0 {
            return Err(AppError::Conflict {
                resource: "email".to_string(),
                message: "An account with this email already exists".to_string(),
            });
        }

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role, first_name, last_name, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(&password_hash)
        .bind(input.role.as_str())
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(&input.phone)
        .fetch_one(&self.db)
        .await?;

        User::try_from(row)
    }

    /// Admin creates a staff account with an explicit role
    pub async fn create(&self, actor: &Actor, input: CreateUserInput) -> AppResult<User> {
        actor.require(Capability::ManageUsers)?;

        let user = self.insert(input).await?;
        tracing::info!(user_id = %user.id, role = %user.role, created_by = %actor.user_id, "User created");
        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::User, user_id))?;

        User::try_from(row)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        role: Option<Role>,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<User>> {
        actor.require(Capability::ManageUsers)?;
        let role = role.map(|r| r.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR role = $1)",
        )
        .bind(role)
        .fetch_one(&self.db)
        .await?;

        let users = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            USER_COLUMNS
        ))
        .bind(role)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data: users,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    /// Enable or disable an account. Disabled accounts cannot log in or refresh.
    pub async fn set_active(&self, actor: &Actor, user_id: Uuid, is_active: bool) -> AppResult<User> {
        actor.require(Capability::ManageUsers)?;

        if user_id == actor.user_id && !is_active {
            return Err(AppError::Validation {
                field: "is_active".to_string(),
                message: "Administrators cannot disable their own account".to_string(),
            });
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::User, user_id))?;

        if !is_active {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .execute(&self.db)
            .await?;
        }

        tracing::info!(%user_id, is_active, "User activation changed");
        User::try_from(row)
    }
}
