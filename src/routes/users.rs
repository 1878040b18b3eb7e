//! Profile, address book and admin user management.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{Address, ListParams, PaginatedResponse, User};
use crate::routes::auth::{AdminUser, AuthUser};
use crate::AppState;

async fn get_profile(State(s): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("user"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1))]
    pub full_name: String,
    pub phone: Option<String>,
}

async fn update_profile(
    State(s): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    req.validate()?;
    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET full_name = $2, phone = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .bind(&req.full_name)
    .bind(&req.phone)
    .fetch_optional(&s.db)
    .await?
    .ok_or(AppError::NotFound("user"))?;
    Ok(Json(updated))
}

async fn list_addresses(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<Address>>> {
    let addresses = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(addresses))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1))]
    pub recipient: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub province: String,
    #[validate(length(min = 1))]
    pub district: String,
    #[validate(length(min = 1))]
    pub ward: String,
    #[validate(length(min = 1))]
    pub street: String,
    #[serde(default)]
    pub is_default: bool,
}

async fn create_address(
    State(s): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddressInput>,
) -> Result<(StatusCode, Json<Address>)> {
    req.validate()?;
    let mut tx = s.db.begin().await?;
    if req.is_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
    }
    let address = sqlx::query_as::<_, Address>(
        "INSERT INTO addresses (id, user_id, recipient, phone, province, district, ward, street,
                                is_default, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user.id)
    .bind(&req.recipient)
    .bind(&req.phone)
    .bind(&req.province)
    .bind(&req.district)
    .bind(&req.ward)
    .bind(&req.street)
    .bind(req.is_default)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn delete_address(
    State(s): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let res = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.id)
        .execute(&s.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("address"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    State(s): State<AppState>,
    _admin: AdminUser,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<User>>> {
    let (page, per_page) = p.paging();
    let data = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE ($1::text IS NULL OR email ILIKE '%' || $1 || '%' OR full_name ILIKE '%' || $1 || '%')
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(&p.search)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM users
         WHERE ($1::text IS NULL OR email ILIKE '%' || $1 || '%' OR full_name ILIKE '%' || $1 || '%')",
    )
    .bind(&p.search)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(PaginatedResponse { data, total: total.0, page }))
}

async fn get_user(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("user"))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

async fn update_role(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<User>> {
    if req.role != "customer" && req.role != "admin" {
        return Err(AppError::BadRequest(format!("unknown role {}", req.role)));
    }
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.role)
    .fetch_optional(&s.db)
    .await?
    .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user))
}

async fn delete_user(
    State(s): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if admin.0.id == id {
        return Err(AppError::BadRequest("cannot delete your own account".into()));
    }
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::Conflict("User still has orders".into())
            }
            _ => AppError::from(e),
        })?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("user"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_profile).put(update_profile))
        .route("/me/addresses", get(list_addresses).post(create_address))
        .route("/me/addresses/:id", axum::routing::delete(delete_address))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", get(get_user).delete(delete_user))
        .route("/admin/users/:id/role", put(update_role))
}
