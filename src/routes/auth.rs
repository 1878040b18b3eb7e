//! Registration, login and the bearer-token extractors.

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::post;
use axum::{async_trait, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::User;
use crate::AppState;

const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
}

/// Authenticated caller, decoded from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(AuthUser { id: data.claims.sub, role: data.claims.role })
    }
}

/// Caller with the admin role; anything else is rejected.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

pub fn issue_token(secret: &str, user_id: Uuid, role: &str) -> Result<String> {
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize;
    let claims = Claims { sub: user_id, role: role.to_string(), exp };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

async fn register(State(s): State<AppState>, Json(req): Json<RegisterRequest>) -> Result<Json<AuthResponse>> {
    req.validate()?;
    let hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, password_hash, full_name, phone, role, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, 'customer', NOW(), NOW())
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(req.email.to_lowercase())
    .bind(&hash)
    .bind(&req.full_name)
    .bind(&req.phone)
    .fetch_one(&s.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Email already exists".into())
        }
        _ => e.into(),
    })?;
    let token = issue_token(&s.config.jwt_secret, user.id, &user.role)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn login(State(s): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(req.email.to_lowercase())
        .fetch_optional(&s.db)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !bcrypt::verify(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }
    let token = issue_token(&s.config.jwt_secret, user.id, &user.role)?;
    Ok(Json(AuthResponse { token, user }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/register", post(register)).route("/login", post(login))
}
