//! Authentication service for customer registration, login, and token management

use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use shared::{Role, User};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::user::{CreateUserInput, UserRow, UserService, USER_COLUMNS};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Input for customer self-registration
#[derive(Debug, Deserialize)]
pub struct RegisterCustomerInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Tokens plus the signed-in user
#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

/// Sign access-token claims
pub fn encode_claims(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate an access token and return its claims
pub fn decode_claims(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Refresh tokens are stored as SHA-256 hex digests
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a customer account and sign it in
    pub async fn register_customer(&self, input: RegisterCustomerInput) -> AppResult<AuthSession> {
        let user = UserService::new(self.db.clone())
            .insert(CreateUserInput {
                email: input.email,
                password: input.password,
                role: Role::Customer,
                first_name: input.first_name,
                last_name: input.last_name,
                phone: input.phone,
            })
            .await?;

        tracing::info!(user_id = %user.id, "Customer registered");

        let tokens = self.generate_tokens(user.id, user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(AuthSession { user, tokens })
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &row.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        if !row.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(row.id)
            .execute(&self.db)
            .await?;

        let user = User::try_from(row)?;
        let tokens = self.generate_tokens(user.id, user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(AuthSession { user, tokens })
    }

    /// Rotate a refresh token: the presented token is revoked and a new pair issued
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_token(refresh_token);
        let mut tx = self.db.begin().await?;

        let (user_id, role) = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE rt.token_hash = $1
              AND u.id = rt.user_id
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = TRUE
            RETURNING u.id, u.role
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".to_string()))?;

        let role: Role = role.parse().map_err(AppError::Internal)?;
        let tokens = self.generate_tokens(user_id, role)?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(&tokens.refresh_token))
        .bind(Utc::now() + Duration::seconds(self.refresh_token_expiry))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(tokens)
    }

    /// Validate access token and return claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        decode_claims(token, &self.jwt_secret)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, role: Role) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode_claims(&access_claims, &self.jwt_secret)?;

        // Refresh token (random, only its digest is persisted)
        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(role: Role, exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: Uuid::from_u128(42).to_string(),
            role,
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn test_token_carries_role() {
        let token = encode_claims(&claims(Role::FactoryWorker, 3600), SECRET).unwrap();
        let decoded = decode_claims(&token, SECRET).unwrap();
        assert_eq!(decoded.role, Role::FactoryWorker);
        assert_eq!(decoded.sub, Uuid::from_u128(42).to_string());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = encode_claims(&claims(Role::Admin, 3600), SECRET).unwrap();
        assert!(matches!(
            decode_claims(&token, "other-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Past the default 60s leeway
        let token = encode_claims(&claims(Role::Driver, -600), SECRET).unwrap();
        assert!(decode_claims(&token, SECRET).is_err());
    }

    #[test]
    fn test_hash_token() {
        let digest = hash_token("refresh");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("refresh"));
        assert_ne!(digest, hash_token("refresh2"));
    }
}
